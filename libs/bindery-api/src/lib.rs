pub mod context;
pub mod converter;
pub mod entity;
pub mod error;
pub mod schema;
pub mod storage;
pub mod value;

pub use bindery_api_derive::Entity;
pub use entity::Entity;

pub use context::Context;
pub use converter::{ConversionPair, ConvertFn, Parsable, Representable};
pub use error::{ConversionError, EntityError, QueryError, RegistrationError, ValidationError};
pub use schema::{AttributeDescriptor, Capability, EntitySchema};
pub use storage::{ListFilter, QueryDriver, QueryFuture, SortOrder};
pub use value::{FromValue, InternalValue, IntoValue, TypedValue, Value, WireMap};
