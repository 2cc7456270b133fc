pub mod error;
pub mod field;
pub mod missing;
pub mod models;
pub mod provider;
pub mod serializer;
pub mod types;
pub mod validating;

pub use error::{DetectError, SerializerError};
pub use field::{Field, FieldFn, FieldRegistry};
pub use missing::MissingSerializer;
pub use models::{BaseModel, Timestamp};
pub use provider::{
    ConversionProvider, Direction, ProviderChain, RepresentableProvider, TextMarshalProvider,
    TypeMapperProvider,
};
pub use serializer::{ModelSerializer, ModelSerializerBuilder, Serializer};
pub use types::FieldTypeMapper;
pub use validating::{RuleValidator, ValidatingSerializer, Validator};
