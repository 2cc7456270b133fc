pub mod error;
pub mod http;
pub mod view;

pub use error::ViewError;
pub use http::router;
pub use view::ModelView;
