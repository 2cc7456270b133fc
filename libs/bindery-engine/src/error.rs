use bindery_api::{ConversionError, EntityError, ValidationError};

/// Failure of one serializer operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializerError {
    /// User-input defect, aggregated over every field of the request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Data or programming defect on the way out. First failure wins.
    #[error("failed to serialize field `{field}` to representation: {source}")]
    Representation {
        field: String,
        source: ConversionError,
    },

    #[error("failed to read field `{field}` from storage: {source}")]
    FromDb {
        field: String,
        source: ConversionError,
    },

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("serializer for entity `{0}` is not configured")]
    Missing(&'static str),
}

impl SerializerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SerializerError::Validation(_))
    }
}

/// A conversion provider could not decide on a converter for an attribute.
///
/// Never fatal: the chain logs it and moves on to the next provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectError {
    #[error("capability declared for `{declared}` on field `{field}` of type `{actual}`")]
    CapabilityMismatch {
        field: String,
        declared: &'static str,
        actual: &'static str,
    },
}
