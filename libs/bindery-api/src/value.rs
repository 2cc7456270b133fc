use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;

use crate::error::ConversionError;

/// Decoded wire object. The HTTP layer parses JSON; the core only sees this map.
pub type WireMap = serde_json::Map<String, serde_json::Value>;

/// Canonical value representation.
///
/// Strategy by type:
/// - Scalars (Bool, Int, UInt, Float, String): wire-compatible as-is
/// - Bytes: storage-level only, standard base64 on the wire
/// - Array, Map: recursive
/// - Typed: an attribute type without a native wire shape (dates, ids, user types),
///   held type-erased until a converter turns it into a scalar
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Typed(TypedValue),
}

type ErasedRef<'a> = &'a (dyn Any + Send + Sync);

/// Type-erased attribute value.
///
/// Cloning is cheap (shared `Arc`). Equality and `Debug` dispatch to the
/// concrete type; `text()` is available when the value was built from a
/// `Display` type.
#[derive(Clone)]
pub struct TypedValue {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
    eq: fn(ErasedRef<'_>, ErasedRef<'_>) -> bool,
    debug: fn(ErasedRef<'_>, &mut fmt::Formatter<'_>) -> fmt::Result,
    text: Option<fn(ErasedRef<'_>) -> Option<String>>,
}

impl TypedValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
            eq: erased_eq::<T>,
            debug: erased_debug::<T>,
            text: None,
        }
    }

    /// Like [`TypedValue::new`], but also records the `Display` form so the
    /// value can act as a lookup key.
    pub fn with_text<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + fmt::Display + Send + Sync,
    {
        let render: fn(ErasedRef<'_>) -> Option<String> = erased_text::<T>;
        Self {
            text: Some(render),
            ..Self::new(value)
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }

    pub fn text(&self) -> Option<String> {
        self.text.and_then(|render| render(&*self.inner))
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        (self.eq)(&*self.inner, &*other.inner)
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(&*self.inner, f)
    }
}

fn erased_eq<T: Any + PartialEq>(a: ErasedRef<'_>, b: ErasedRef<'_>) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn erased_debug<T: Any + fmt::Debug>(v: ErasedRef<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v.downcast_ref::<T>() {
        Some(v) => v.fmt(f),
        None => f.write_str("<erased>"),
    }
}

fn erased_text<T: Any + fmt::Display>(v: ErasedRef<'_>) -> Option<String> {
    v.downcast_ref::<T>().map(ToString::to_string)
}

impl Value {
    pub fn typed<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
    {
        Value::Typed(TypedValue::new(value))
    }

    pub fn typed_text<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + fmt::Display + Send + Sync,
    {
        Value::Typed(TypedValue::with_text(value))
    }

    /// Short type tag, used in conversion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Typed(_) => "typed",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or a string/bytes/array/map with no content.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => i64::try_from(*v as i128).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::UInt(v) => Some(*v),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => u64::try_from(*v as i128).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Typed(t) => t.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Clone the typed payload out, or fail with a type mismatch.
    pub fn downcast_cloned<T: Any + Clone>(&self) -> Result<T, ConversionError> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ConversionError::type_mismatch(std::any::type_name::<T>(), self))
    }

    /// Canonical text of a scalar, used to compare ids and filter values
    /// that arrived in different shapes (`1` vs `"1"`).
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::UInt(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Typed(t) => t.text(),
            _ => None,
        }
    }

    /// Convert to a wire value. Typed values have no wire shape of their own
    /// and must pass through a converter first.
    pub fn to_json(&self) -> Result<serde_json::Value, ConversionError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::UInt(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ConversionError::OutOfRange {
                    value: v.to_string(),
                    target: "json number",
                })?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ConversionError>>()?,
            ),
            Value::Typed(t) => return Err(ConversionError::NotRepresentable(t.type_name())),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => write!(f, "<array of {}>", items.len()),
            Value::Map(entries) => write!(f, "<map of {}>", entries.len()),
            Value::Typed(t) => match t.text() {
                Some(text) => f.write_str(&text),
                None => write!(f, "<{}>", t.type_name()),
            },
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(entries) => serializer.collect_map(entries),
            Value::Typed(t) => Err(serde::ser::Error::custom(
                ConversionError::NotRepresentable(t.type_name()),
            )),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else if let Some(v) = n.as_u64() {
                    Value::UInt(v)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Float)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        Value::from(value.clone())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

// ---------------------------------------------------------------------------
// Attribute conversions: Rust attribute types <-> Value
// ---------------------------------------------------------------------------

/// Lift an entity attribute into a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Lower a [`Value`] back into an entity attribute.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

macro_rules! integer_value {
    ($variant:ident => $($ty:ty),*) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self.into())
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    v.into_value()
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let out_of_range = || ConversionError::OutOfRange {
                        value: value.to_string(),
                        target: stringify!($ty),
                    };
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        Value::UInt(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        Value::Float(v) if v.is_finite() && v.fract() == 0.0 => {
                            <$ty>::try_from(*v as i128).map_err(|_| out_of_range())
                        }
                        other => Err(ConversionError::type_mismatch(stringify!($ty), other)),
                    }
                }
            }
        )*
    };
}

integer_value!(Int => i8, i16, i32, i64);
integer_value!(UInt => u8, u16, u32, u64);

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value
            .as_f64()
            .ok_or_else(|| ConversionError::type_mismatch("f64", value))
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| ConversionError::type_mismatch("f32", value))
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value
            .as_bool()
            .ok_or_else(|| ConversionError::type_mismatch("bool", value))
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConversionError::type_mismatch("string", value))
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| e.with_context(format!("[{i}]"))))
                .collect(),
            other => Err(ConversionError::type_mismatch("array", other)),
        }
    }
}

impl IntoValue for serde_json::Value {
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value.to_json()
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

// ---------------------------------------------------------------------------
// InternalValue
// ---------------------------------------------------------------------------

/// Pivot representation of one entity instance: field name -> value.
///
/// Sits between wire maps, storage rows and typed entities. Never persisted
/// as-is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InternalValue(BTreeMap<String, Value>);

impl InternalValue {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Lift a decoded wire map, value by value.
    pub fn from_wire(raw: &WireMap) -> Self {
        raw.iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for InternalValue {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for InternalValue {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(String, Value)> for InternalValue {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for InternalValue {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Day(u32);

    impl fmt::Display for Day {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "day-{}", self.0)
        }
    }

    #[test]
    fn json_numbers_prefer_signed() {
        assert_eq!(Value::from(serde_json::json!(1)), Value::Int(1));
        assert_eq!(Value::from(serde_json::json!(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
    }

    #[test]
    fn typed_values_compare_by_payload() {
        assert_eq!(Value::typed(Day(3)), Value::typed(Day(3)));
        assert_ne!(Value::typed(Day(3)), Value::typed(Day(4)));
        assert_ne!(Value::typed(Day(3)), Value::typed(3u32));
        assert_eq!(Value::typed(Day(3)).downcast_ref::<Day>(), Some(&Day(3)));
    }

    #[test]
    fn typed_values_have_no_wire_shape() {
        let err = Value::typed(Day(1)).to_json().unwrap_err();
        assert!(matches!(err, ConversionError::NotRepresentable(_)));
        assert!(serde_json::to_value(Value::typed(Day(1))).is_err());
    }

    #[test]
    fn keys_normalise_scalars_and_text_typed() {
        assert_eq!(Value::UInt(7).as_key(), Value::from("7").as_key());
        assert_eq!(Value::typed_text(Day(2)).as_key().as_deref(), Some("day-2"));
        assert_eq!(Value::typed(Day(2)).as_key(), None);
    }

    #[test]
    fn bytes_go_out_as_base64() {
        let json = Value::Bytes(b"hi".to_vec()).to_json().unwrap();
        assert_eq!(json, serde_json::json!("aGk="));
    }

    #[test]
    fn nan_is_rejected_on_the_wire() {
        assert!(Value::Float(f64::NAN).to_json().is_err());
    }

    #[test]
    fn integer_conversion_checks_range() {
        assert_eq!(u8::from_value(&Value::Int(200)).unwrap(), 200);
        assert!(u8::from_value(&Value::Int(300)).is_err());
        assert!(u64::from_value(&Value::Int(-1)).is_err());
        assert_eq!(i64::from_value(&Value::Float(4.0)).unwrap(), 4);
        assert!(i64::from_value(&Value::Float(4.5)).is_err());
        assert!(i64::from_value(&Value::from("4")).is_err());
    }

    #[test]
    fn option_and_vec_round_trip() {
        let v = Some(vec![1u32, 2]).into_value();
        assert_eq!(v, Value::Array(vec![Value::UInt(1), Value::UInt(2)]));
        assert_eq!(Option::<Vec<u32>>::from_value(&v).unwrap(), Some(vec![1, 2]));
        assert_eq!(Option::<u32>::from_value(&Value::Null).unwrap(), None);
    }

    #[test]
    fn vec_errors_name_the_index() {
        let err = Vec::<u8>::from_value(&Value::Array(vec![Value::Int(1), Value::from("x")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "[1]: expected u8, got string");
    }

    #[test]
    fn internal_value_from_wire() {
        let wire = serde_json::json!({"name": "John", "age": 30});
        let iv = InternalValue::from_wire(wire.as_object().unwrap());
        assert_eq!(iv.get("name"), Some(&Value::from("John")));
        assert_eq!(iv.get("age"), Some(&Value::Int(30)));
        assert_eq!(iv.keys().collect::<Vec<_>>(), vec!["age", "name"]);
    }
}
