use std::fmt;
use std::sync::Arc;

use bindery_api::{
    Context, Entity, InternalValue, RegistrationError, ValidationError, Value, WireMap,
};

use crate::error::SerializerError;
use crate::field::{Field, FieldRegistry};
use crate::provider::ProviderChain;
use crate::types::FieldTypeMapper;

/// Four-way transform between wire maps, internal values and storage rows.
///
/// Implementations hold no per-request state; one instance serves every
/// request concurrently.
pub trait Serializer: Send + Sync {
    /// Wire input -> internal value. Every field problem is reported in one
    /// [`ValidationError`].
    fn to_internal_value(&self, raw: &WireMap, ctx: &Context) -> Result<InternalValue, SerializerError>;

    /// Internal value -> wire output of the readable fields.
    fn to_representation(&self, value: &InternalValue, ctx: &Context) -> Result<WireMap, SerializerError>;

    /// Storage row -> internal value. Columns without a field are dropped.
    fn from_db(&self, row: &InternalValue, ctx: &Context) -> Result<InternalValue, SerializerError>;

    /// Cross-field validation hook.
    fn validate(&self, _value: &InternalValue, _ctx: &Context) -> Result<(), SerializerError> {
        Ok(())
    }

    /// Registered field names, in registration order.
    fn field_names(&self) -> Vec<String>;
}

impl<S: Serializer + ?Sized> Serializer for Arc<S> {
    fn to_internal_value(&self, raw: &WireMap, ctx: &Context) -> Result<InternalValue, SerializerError> {
        (**self).to_internal_value(raw, ctx)
    }

    fn to_representation(&self, value: &InternalValue, ctx: &Context) -> Result<WireMap, SerializerError> {
        (**self).to_representation(value, ctx)
    }

    fn from_db(&self, row: &InternalValue, ctx: &Context) -> Result<InternalValue, SerializerError> {
        (**self).from_db(row, ctx)
    }

    fn validate(&self, value: &InternalValue, ctx: &Context) -> Result<(), SerializerError> {
        (**self).validate(value, ctx)
    }

    fn field_names(&self) -> Vec<String> {
        (**self).field_names()
    }
}

// ---------------------------------------------------------------------------
// ModelSerializer
// ---------------------------------------------------------------------------

/// Serializer driven by the field registry of entity `E`.
pub struct ModelSerializer<E> {
    fields: FieldRegistry<E>,
}

impl<E: Entity> ModelSerializer<E> {
    /// All entity attributes, standard provider chain.
    pub fn new() -> Result<Self, RegistrationError> {
        Self::builder().build()
    }

    pub fn builder() -> ModelSerializerBuilder<E> {
        ModelSerializerBuilder::new()
    }

    pub fn from_registry(fields: FieldRegistry<E>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FieldRegistry<E> {
        &self.fields
    }

    fn not_accepted(&self, key: &str) -> String {
        format!(
            "Field `{key}` is not accepted by this endpoint, accepted fields: {}",
            self.fields.names().join(", ")
        )
    }
}

impl<E: Entity> Serializer for ModelSerializer<E> {
    fn to_internal_value(&self, raw: &WireMap, ctx: &Context) -> Result<InternalValue, SerializerError> {
        let input = InternalValue::from_wire(raw);
        let mut errors = ValidationError::new();
        let mut out = InternalValue::new();

        for key in input.keys() {
            let Some(field) = self.fields.get(key) else {
                errors.add(key, self.not_accepted(key));
                continue;
            };
            if !field.is_writable() {
                continue;
            }
            let converted = field
                .to_internal_value(&input, ctx)
                .map_err(|e| e.to_string())
                .and_then(|value| decodes_as::<E>(key, &value).map(|()| value));
            match converted {
                Ok(value) => {
                    out.insert(key, value);
                }
                Err(message) => errors.add(key, message),
            }
        }

        if !errors.is_empty() {
            tracing::debug!(
                entity = self.fields.entity(),
                fields = errors.field_errors().len(),
                "wire input rejected"
            );
        }
        errors.into_result()?;
        Ok(out)
    }

    fn to_representation(&self, value: &InternalValue, ctx: &Context) -> Result<WireMap, SerializerError> {
        let mut out = WireMap::new();
        for field in self.fields.iter().filter(|f| f.is_readable()) {
            let json = field
                .to_representation(value, ctx)
                .and_then(|v| v.to_json())
                .map_err(|source| SerializerError::Representation {
                    field: field.name().to_string(),
                    source,
                })?;
            out.insert(field.name().to_string(), json);
        }
        Ok(out)
    }

    fn from_db(&self, row: &InternalValue, ctx: &Context) -> Result<InternalValue, SerializerError> {
        let mut out = InternalValue::new();
        for key in row.keys() {
            let Some(field) = self.fields.get(key) else {
                continue;
            };
            let value = field
                .from_db(row, ctx)
                .map_err(|source| SerializerError::FromDb {
                    field: key.to_string(),
                    source,
                })?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.names().into_iter().map(str::to_string).collect()
    }
}

/// Converted input must decode into `E` before it can be stored. Extra
/// fields unknown to the entity are not checked.
fn decodes_as<E: Entity>(key: &str, value: &Value) -> Result<(), String> {
    let single = InternalValue::new().with(key, value.clone());
    E::from_internal_value(&single)
        .map(drop)
        .map_err(|e| e.source.to_string())
}

impl<E> fmt::Debug for ModelSerializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSerializer")
            .field("fields", &self.fields)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

type Mutator<E> = Box<dyn FnOnce(Field<E>) -> Field<E>>;

enum Operation<E> {
    ModelFields(Vec<String>),
    NewField(Field<E>),
    UpdateField(String, Mutator<E>),
}

/// Startup-time construction of a [`ModelSerializer`].
///
/// Operations are recorded and applied in order by [`build`](Self::build),
/// which reports every unknown field reference at once instead of stopping
/// at the first.
pub struct ModelSerializerBuilder<E> {
    mapper: Option<FieldTypeMapper>,
    chain: Option<ProviderChain>,
    operations: Vec<Operation<E>>,
}

impl<E: Entity> ModelSerializerBuilder<E> {
    pub fn new() -> Self {
        Self {
            mapper: None,
            chain: None,
            operations: Vec::new(),
        }
    }

    /// Type mapper for the standard provider chain.
    pub fn with_type_mapper(mut self, mapper: FieldTypeMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Replace the provider chain entirely; the type mapper is then unused.
    pub fn with_provider_chain(mut self, chain: ProviderChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Restrict the serializer to `names`, in that order.
    pub fn with_model_fields<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.operations.push(Operation::ModelFields(names));
        self
    }

    /// Add a field, or replace the one with the same name.
    pub fn with_new_field(mut self, field: Field<E>) -> Self {
        self.operations.push(Operation::NewField(field));
        self
    }

    /// Modify an existing field.
    pub fn with_field<F>(mut self, name: impl Into<String>, mutator: F) -> Self
    where
        F: FnOnce(Field<E>) -> Field<E> + 'static,
    {
        self.operations
            .push(Operation::UpdateField(name.into(), Box::new(mutator)));
        self
    }

    pub fn build(self) -> Result<ModelSerializer<E>, RegistrationError> {
        let schema = bindery_api::entity::schema_of::<E>()?;
        let chain = match self.chain {
            Some(chain) => chain,
            None => ProviderChain::new(Arc::new(self.mapper.unwrap_or_default())),
        };
        let mut fields = FieldRegistry::from_schema(&schema, &chain);

        let mut errors = Vec::new();
        for operation in self.operations {
            let result = match operation {
                Operation::ModelFields(names) => fields.restrict(&names),
                Operation::NewField(field) => {
                    fields.register(field);
                    Ok(())
                }
                Operation::UpdateField(name, mutator) => fields.update(&name, mutator),
            };
            match result {
                Ok(()) => {}
                Err(RegistrationError::Many(many)) => errors.extend(many),
                Err(e) => errors.push(e),
            }
        }
        RegistrationError::check(errors)?;

        tracing::debug!(
            entity = E::NAME,
            fields = ?fields.names(),
            "serializer built"
        );
        Ok(ModelSerializer::from_registry(fields))
    }
}

impl<E: Entity> Default for ModelSerializerBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
