use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use bindery_api::{AttributeDescriptor, ConversionPair, ConvertFn, FromValue, IntoValue, Value};

struct TypeMapping {
    type_name: &'static str,
    pair: ConversionPair,
}

/// Type-to-converter mapping table.
///
/// Keyed by the attribute's `TypeId`, once for `T` and once for `Option<T>`.
/// An attribute without an entry for its own nullability uses the other
/// form, with `Null` passed through.
pub struct FieldTypeMapper {
    plain: HashMap<TypeId, TypeMapping>,
    nullable: HashMap<TypeId, TypeMapping>,
}

macro_rules! scalar_mappings {
    ($mapper:ident, $($ty:ty),* $(,)?) => {
        $( $mapper.register::<$ty>(scalar_pair::<$ty>()); )*
    };
}

impl FieldTypeMapper {
    /// Table with no entries.
    pub fn empty() -> Self {
        Self {
            plain: HashMap::new(),
            nullable: HashMap::new(),
        }
    }

    /// Table covering the primitive attribute types.
    pub fn new() -> Self {
        let mut mapper = Self::empty();
        scalar_mappings!(
            mapper,
            bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, serde_json::Value,
        );
        mapper
    }

    /// Converters for attributes declared as `T`.
    pub fn register<T: Any>(&mut self, pair: ConversionPair) -> &mut Self {
        self.plain.insert(
            TypeId::of::<T>(),
            TypeMapping {
                type_name: std::any::type_name::<T>(),
                pair,
            },
        );
        self
    }

    /// Converters for attributes declared as `Option<T>`.
    pub fn register_optional<T: Any>(&mut self, pair: ConversionPair) -> &mut Self {
        self.nullable.insert(
            TypeId::of::<T>(),
            TypeMapping {
                type_name: std::any::type_name::<T>(),
                pair,
            },
        );
        self
    }

    pub fn with<T: Any>(mut self, pair: ConversionPair) -> Self {
        self.register::<T>(pair);
        self
    }

    pub fn with_optional<T: Any>(mut self, pair: ConversionPair) -> Self {
        self.register_optional::<T>(pair);
        self
    }

    pub fn len(&self) -> usize {
        self.plain.len() + self.nullable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converters for `attr`: exact match on nullability first, then the
    /// assignable form.
    pub fn lookup(&self, attr: &AttributeDescriptor) -> Option<ConversionPair> {
        let key = attr.type_id();
        let (exact, assignable) = if attr.is_nullable() {
            (self.nullable.get(&key), self.plain.get(&key))
        } else {
            (self.plain.get(&key), self.nullable.get(&key))
        };
        match (exact, assignable) {
            (Some(mapping), _) => Some(mapping.pair.clone()),
            (None, Some(mapping)) => Some(ConversionPair::new(
                null_passthrough(mapping.pair.to_representation.clone()),
                null_passthrough(mapping.pair.to_internal_value.clone()),
            )),
            (None, None) => None,
        }
    }
}

impl Default for FieldTypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldTypeMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut plain: Vec<_> = self.plain.values().map(|m| m.type_name).collect();
        let mut nullable: Vec<_> = self.nullable.values().map(|m| m.type_name).collect();
        plain.sort_unstable();
        nullable.sort_unstable();
        f.debug_struct("FieldTypeMapper")
            .field("plain", &plain)
            .field("nullable", &nullable)
            .finish()
    }
}

/// Both directions type-check the value and normalise it to the canonical
/// variant of `T` (`UInt` for unsigned integers, `Float` for floats, ...).
fn scalar_pair<T>() -> ConversionPair
where
    T: FromValue + IntoValue + 'static,
{
    let convert: ConvertFn = Arc::new(|value: &Value| T::from_value(value).map(IntoValue::into_value));
    ConversionPair::new(convert.clone(), convert)
}

fn null_passthrough(inner: ConvertFn) -> ConvertFn {
    Arc::new(move |value: &Value| match value {
        Value::Null => Ok(Value::Null),
        other => inner(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_api::ConversionError;

    fn to_internal(mapper: &FieldTypeMapper, attr: &AttributeDescriptor, value: Value) -> Result<Value, ConversionError> {
        let pair = mapper.lookup(attr).unwrap();
        (pair.to_internal_value)(&value)
    }

    #[test]
    fn default_table_checks_types() {
        let mapper = FieldTypeMapper::new();
        let name = AttributeDescriptor::of::<String>("name");
        assert_eq!(to_internal(&mapper, &name, Value::from("John")).unwrap(), Value::from("John"));
        assert_eq!(
            to_internal(&mapper, &name, Value::Int(1)).unwrap_err().to_string(),
            "expected string, got int"
        );
    }

    #[test]
    fn default_table_normalises_numbers() {
        let mapper = FieldTypeMapper::new();
        let id = AttributeDescriptor::of::<u64>("id");
        assert_eq!(to_internal(&mapper, &id, Value::Int(7)).unwrap(), Value::UInt(7));
        assert!(to_internal(&mapper, &id, Value::Int(-7)).is_err());

        let ratio = AttributeDescriptor::of::<f32>("ratio");
        assert_eq!(to_internal(&mapper, &ratio, Value::Int(2)).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn nullable_attributes_use_the_plain_mapping() {
        let mapper = FieldTypeMapper::new();
        let nickname = AttributeDescriptor::optional::<String>("nickname");
        assert_eq!(to_internal(&mapper, &nickname, Value::Null).unwrap(), Value::Null);
        assert!(to_internal(&mapper, &nickname, Value::Bool(true)).is_err());

        let plain = AttributeDescriptor::of::<String>("name");
        assert!(to_internal(&mapper, &plain, Value::Null).is_err());
    }

    #[test]
    fn unknown_types_are_not_mapped() {
        #[derive(Debug)]
        struct Opaque;
        let mapper = FieldTypeMapper::new();
        assert!(mapper.lookup(&AttributeDescriptor::of::<Opaque>("x")).is_none());
    }

    #[test]
    fn both_forms_registered_match_exactly() {
        let mapper = FieldTypeMapper::new().with_optional::<u16>(ConversionPair::passthrough());

        let port = AttributeDescriptor::of::<u16>("port");
        assert_eq!(to_internal(&mapper, &port, Value::Int(80)).unwrap(), Value::UInt(80));
        assert_eq!(
            to_internal(&mapper, &port, Value::from("not a number")).unwrap_err().to_string(),
            "expected u16, got string"
        );

        let fallback = AttributeDescriptor::optional::<u16>("fallback");
        assert_eq!(
            to_internal(&mapper, &fallback, Value::from("anything")).unwrap(),
            Value::from("anything")
        );
    }

    #[test]
    fn optional_mapping_serves_plain_attributes() {
        let mapper = FieldTypeMapper::empty().with_optional::<u8>(ConversionPair::passthrough());
        assert!(mapper.lookup(&AttributeDescriptor::of::<u8>("n")).is_some());
    }
}
