use bindery_api::{QueryError, RegistrationError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("serializer setup: {0}")]
    Registration(#[from] RegistrationError),

    #[error("storage: {0}")]
    Query(#[from] QueryError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
