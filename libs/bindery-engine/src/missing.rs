use std::marker::PhantomData;

use bindery_api::{Context, Entity, InternalValue, WireMap};

use crate::error::SerializerError;
use crate::serializer::Serializer;

/// Placeholder for an entity whose serializer has not been set up.
/// Every operation fails.
pub struct MissingSerializer<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MissingSerializer<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }

    fn error(&self) -> SerializerError {
        tracing::error!(entity = E::NAME, "serializer is not configured");
        SerializerError::Missing(E::NAME)
    }
}

impl<E: Entity> Default for MissingSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Serializer for MissingSerializer<E> {
    fn to_internal_value(&self, _raw: &WireMap, _ctx: &Context) -> Result<InternalValue, SerializerError> {
        Err(self.error())
    }

    fn to_representation(&self, _value: &InternalValue, _ctx: &Context) -> Result<WireMap, SerializerError> {
        Err(self.error())
    }

    fn from_db(&self, _row: &InternalValue, _ctx: &Context) -> Result<InternalValue, SerializerError> {
        Err(self.error())
    }

    fn validate(&self, _value: &InternalValue, _ctx: &Context) -> Result<(), SerializerError> {
        Err(self.error())
    }

    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }
}
