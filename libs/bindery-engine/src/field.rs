use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bindery_api::{
    ConversionError, ConversionPair, ConvertFn, Context, Entity, EntitySchema, InternalValue,
    RegistrationError, Value,
};

use crate::provider::ProviderChain;

/// Field-level function: reads `values[name]` (or anything else in `values`)
/// and produces the converted value for `name`.
pub type FieldFn =
    Arc<dyn Fn(&InternalValue, &str, &Context) -> Result<Value, ConversionError> + Send + Sync>;

/// Adapt a value converter into a field function. A missing key yields
/// `Null` without calling the converter.
pub fn field_fn(convert: ConvertFn) -> FieldFn {
    Arc::new(move |values: &InternalValue, name: &str, _ctx: &Context| match values.get(name) {
        Some(value) => convert(value),
        None => Ok(Value::Null),
    })
}

fn passthrough_field() -> FieldFn {
    Arc::new(|values: &InternalValue, name: &str, _ctx: &Context| {
        Ok(values.get(name).cloned().unwrap_or_default())
    })
}

/// One named conversion unit of entity `E`.
pub struct Field<E> {
    name: String,
    readable: bool,
    writable: bool,
    to_representation: FieldFn,
    to_internal_value: FieldFn,
    from_db: FieldFn,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Field<E> {
    /// Readable, writable, pass-through in every direction.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: true,
            writable: true,
            to_representation: passthrough_field(),
            to_internal_value: passthrough_field(),
            from_db: passthrough_field(),
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Output only: input keys for this field are accepted and dropped.
    pub fn read_only(self) -> Self {
        self.with_writable(false)
    }

    /// Input only: never emitted in representations.
    pub fn write_only(self) -> Self {
        self.with_readable(false)
    }

    pub fn with_to_representation<F>(mut self, f: F) -> Self
    where
        F: Fn(&InternalValue, &str, &Context) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.to_representation = Arc::new(f);
        self
    }

    pub fn with_to_internal_value<F>(mut self, f: F) -> Self
    where
        F: Fn(&InternalValue, &str, &Context) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.to_internal_value = Arc::new(f);
        self
    }

    pub fn with_from_db<F>(mut self, f: F) -> Self
    where
        F: Fn(&InternalValue, &str, &Context) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.from_db = Arc::new(f);
        self
    }

    /// Use a detected (or hand-written) converter pair for the wire
    /// directions. Storage reads stay pass-through.
    pub fn with_conversion(mut self, pair: ConversionPair) -> Self {
        self.to_representation = field_fn(pair.to_representation);
        self.to_internal_value = field_fn(pair.to_internal_value);
        self
    }

    pub fn to_representation(&self, values: &InternalValue, ctx: &Context) -> Result<Value, ConversionError> {
        (self.to_representation)(values, &self.name, ctx)
    }

    pub fn to_internal_value(&self, values: &InternalValue, ctx: &Context) -> Result<Value, ConversionError> {
        (self.to_internal_value)(values, &self.name, ctx)
    }

    pub fn from_db(&self, values: &InternalValue, ctx: &Context) -> Result<Value, ConversionError> {
        (self.from_db)(values, &self.name, ctx)
    }
}

impl<E> Clone for Field<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            readable: self.readable,
            writable: self.writable,
            to_representation: self.to_representation.clone(),
            to_internal_value: self.to_internal_value.clone(),
            from_db: self.from_db.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FieldRegistry
// ---------------------------------------------------------------------------

/// Named fields of one serializer, in registration order.
///
/// Owned by a single serializer; built at startup and read-only while
/// serving requests.
pub struct FieldRegistry<E> {
    entity: &'static str,
    fields: Vec<Field<E>>,
}

impl<E: Entity> FieldRegistry<E> {
    pub fn new() -> Self {
        Self {
            entity: E::NAME,
            fields: Vec::new(),
        }
    }

    /// One readable, writable field per schema attribute, converters resolved
    /// through `chain`.
    pub fn from_schema(schema: &EntitySchema, chain: &ProviderChain) -> Self {
        let mut registry = Self::new();
        for attr in schema.attributes() {
            let pair = chain.resolve(schema.entity(), attr);
            registry.register(Field::new(attr.name()).with_conversion(pair));
        }
        tracing::debug!(
            entity = registry.entity,
            fields = registry.fields.len(),
            "field registry built from schema"
        );
        registry
    }

    pub fn from_entity(chain: &ProviderChain) -> Result<Self, RegistrationError> {
        let schema = bindery_api::entity::schema_of::<E>()?;
        Ok(Self::from_schema(&schema, chain))
    }

    /// Insert `field`, or replace the field of the same name in place.
    /// Returns the replaced field.
    pub fn register(&mut self, field: Field<E>) -> Option<Field<E>> {
        match self.position(field.name()) {
            Some(idx) => Some(std::mem::replace(&mut self.fields[idx], field)),
            None => {
                self.fields.push(field);
                None
            }
        }
    }

    /// Apply `mutator` to an existing field. An unknown name is a
    /// configuration defect.
    pub fn update<F>(&mut self, name: &str, mutator: F) -> Result<(), RegistrationError>
    where
        F: FnOnce(Field<E>) -> Field<E>,
    {
        let idx = self.position(name).ok_or_else(|| self.unknown(name))?;
        let updated = mutator(self.fields[idx].clone());
        if updated.name() != name {
            return Err(RegistrationError::RenamedField {
                entity: self.entity.to_string(),
                field: name.to_string(),
                renamed: updated.name().to_string(),
            });
        }
        self.fields[idx] = updated;
        Ok(())
    }

    /// Keep only `names`, in the order given.
    pub fn restrict<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), RegistrationError> {
        let errors: Vec<_> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| self.position(name).is_none())
            .map(|name| self.unknown(name))
            .collect();
        RegistrationError::check(errors)?;

        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            if let Some(idx) = self.position(name.as_ref()) {
                kept.push(self.fields.swap_remove(idx));
            }
        }
        self.fields = kept;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Field<E>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field<E>> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    fn unknown(&self, name: &str) -> RegistrationError {
        RegistrationError::UnknownField {
            entity: self.entity.to_string(),
            field: name.to_string(),
            known: self.names().into_iter().map(str::to_string).collect(),
        }
    }
}

impl<E: Entity> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for FieldRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity,
            fields: self.fields.clone(),
        }
    }
}

impl<E> fmt::Debug for FieldRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("entity", &self.entity)
            .field("fields", &self.fields)
            .finish()
    }
}
