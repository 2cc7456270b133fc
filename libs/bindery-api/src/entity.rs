use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{EntityError, RegistrationError};
use crate::schema::{AttributeDescriptor, EntitySchema};
use crate::value::InternalValue;

/// A typed, storage-backed record type.
///
/// Usually generated with `#[derive(Entity)]`; see the derive for the
/// attribute syntax. Conversions are shallow: nested structured attributes
/// are kept whole as one value, never decomposed.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Entity name used in error messages and logs.
    const NAME: &'static str;

    /// Tagged attributes in declaration order, flattened sub-entities inlined.
    fn attributes() -> Vec<AttributeDescriptor>;

    /// One entry per tagged attribute, keyed by wire name.
    fn to_internal_value(&self) -> InternalValue;

    /// Inverse of [`Entity::to_internal_value`]. Extra keys are ignored,
    /// absent keys take the attribute's `Default`.
    fn from_internal_value(value: &InternalValue) -> Result<Self, EntityError>;
}

/// Registry of discovered entity schemas.
///
/// Written once per entity type, read on every serializer construction.
struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<EntitySchema>>>,
}

impl SchemaRegistry {
    fn get(&self, key: TypeId) -> Option<Arc<EntitySchema>> {
        let guard = match self.schemas.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("schema registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.get(&key).cloned()
    }

    /// Insert unless another thread got there first; returns the stored schema.
    fn insert(&self, key: TypeId, schema: Arc<EntitySchema>) -> Arc<EntitySchema> {
        let mut guard = match self.schemas.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("schema registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.entry(key).or_insert(schema).clone()
    }
}

fn registry() -> &'static SchemaRegistry {
    static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| SchemaRegistry {
        schemas: RwLock::new(HashMap::new()),
    })
}

/// Discover the schema of `E`, once per process; later calls share the cached `Arc`.
pub fn schema_of<E: Entity>() -> Result<Arc<EntitySchema>, RegistrationError> {
    let key = TypeId::of::<E>();
    if let Some(schema) = registry().get(key) {
        return Ok(schema);
    }
    let schema = Arc::new(EntitySchema::new(E::NAME, E::attributes())?);
    tracing::debug!(
        entity = E::NAME,
        attributes = schema.attributes().len(),
        "discovered entity schema"
    );
    Ok(registry().insert(key, schema))
}

/// Shallow translation of an entity into its internal value.
pub fn as_internal_value<E: Entity>(entity: &E) -> InternalValue {
    entity.to_internal_value()
}

/// Build a typed entity from an internal value.
pub fn as_entity<E: Entity>(value: &InternalValue) -> Result<E, EntityError> {
    E::from_internal_value(value)
}

/// Wire name -> declared Rust type, for diagnostics.
pub fn detect_attributes<E: Entity>() -> BTreeMap<String, String> {
    E::attributes()
        .iter()
        .map(|attr| (attr.name().to_string(), attr.declared_type()))
        .collect()
}

// ---------------------------------------------------------------------------
// Support functions for `#[derive(Entity)]`
// ---------------------------------------------------------------------------

#[doc(hidden)]
pub mod __private {
    use std::any::Any;
    use std::fmt;
    use std::str::FromStr;

    use crate::error::{ConversionError, EntityError};
    use crate::value::{FromValue, InternalValue, Value};

    fn fail(entity: &str, field: &str) -> impl FnOnce(ConversionError) -> EntityError {
        move |source| EntityError::new(entity, field, source)
    }

    pub fn decode<T>(values: &InternalValue, entity: &str, field: &str) -> Result<T, EntityError>
    where
        T: FromValue + Default,
    {
        match values.get(field) {
            Some(value) => T::from_value(value).map_err(fail(entity, field)),
            None => Ok(T::default()),
        }
    }

    pub fn encode_typed<T>(value: &T) -> Value
    where
        T: Any + Clone + PartialEq + fmt::Debug + Send + Sync,
    {
        Value::typed(value.clone())
    }

    pub fn encode_typed_opt<T>(value: &Option<T>) -> Value
    where
        T: Any + Clone + PartialEq + fmt::Debug + Send + Sync,
    {
        value.as_ref().map_or(Value::Null, encode_typed)
    }

    pub fn encode_text<T>(value: &T) -> Value
    where
        T: Any + Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync,
    {
        Value::typed_text(value.clone())
    }

    pub fn encode_text_opt<T>(value: &Option<T>) -> Value
    where
        T: Any + Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync,
    {
        value.as_ref().map_or(Value::Null, encode_text)
    }

    pub fn decode_typed<T>(values: &InternalValue, entity: &str, field: &str) -> Result<T, EntityError>
    where
        T: Any + Clone + Default,
    {
        match values.get(field) {
            Some(value) => value.downcast_cloned::<T>().map_err(fail(entity, field)),
            None => Ok(T::default()),
        }
    }

    pub fn decode_typed_opt<T>(
        values: &InternalValue,
        entity: &str,
        field: &str,
    ) -> Result<Option<T>, EntityError>
    where
        T: Any + Clone,
    {
        match values.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.downcast_cloned::<T>().map(Some).map_err(fail(entity, field)),
        }
    }

    /// Typed payload, or its text form as stored by a text-only backend.
    fn from_text<T>(value: &Value) -> Result<T, ConversionError>
    where
        T: Any + Clone + FromStr,
        T::Err: fmt::Display,
    {
        match value {
            Value::String(s) => s.parse::<T>().map_err(|e| ConversionError::Parse {
                input: s.clone(),
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            }),
            other => other.downcast_cloned::<T>(),
        }
    }

    pub fn decode_text<T>(values: &InternalValue, entity: &str, field: &str) -> Result<T, EntityError>
    where
        T: Any + Clone + Default + FromStr,
        T::Err: fmt::Display,
    {
        match values.get(field) {
            Some(value) => from_text::<T>(value).map_err(fail(entity, field)),
            None => Ok(T::default()),
        }
    }

    pub fn decode_text_opt<T>(
        values: &InternalValue,
        entity: &str,
        field: &str,
    ) -> Result<Option<T>, EntityError>
    where
        T: Any + Clone + FromStr,
        T::Err: fmt::Display,
    {
        match values.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => from_text::<T>(value).map(Some).map_err(fail(entity, field)),
        }
    }
}
