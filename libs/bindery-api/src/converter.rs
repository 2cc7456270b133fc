use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConversionError;
use crate::value::Value;

/// Field-level value conversion.
///
/// Principle: pass-through always works, a converter narrows or reshapes one
/// specific type. Converters run concurrently for different requests and must
/// not keep state between calls.
pub type ConvertFn = Arc<dyn Fn(&Value) -> Result<Value, ConversionError> + Send + Sync>;

/// Value as-is, no conversion.
pub fn passthrough() -> ConvertFn {
    Arc::new(|value: &Value| Ok(value.clone()))
}

/// Both directions of a field conversion.
#[derive(Clone)]
pub struct ConversionPair {
    pub to_representation: ConvertFn,
    pub to_internal_value: ConvertFn,
}

impl ConversionPair {
    pub fn new(to_representation: ConvertFn, to_internal_value: ConvertFn) -> Self {
        Self {
            to_representation,
            to_internal_value,
        }
    }

    pub fn passthrough() -> Self {
        Self::new(passthrough(), passthrough())
    }
}

impl fmt::Debug for ConversionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionPair").finish_non_exhaustive()
    }
}

/// Explicit capability: the type knows its own wire form.
pub trait Representable {
    fn to_representation(&self) -> Result<Value, ConversionError>;
}

/// Explicit capability: the type knows how to read itself from wire input.
pub trait Parsable: Sized {
    fn parse(value: &Value) -> Result<Self, ConversionError>;
}

pub(crate) fn representable_fn<T>() -> ConvertFn
where
    T: Representable + Any,
{
    Arc::new(|value: &Value| match value {
        Value::Null => Ok(Value::Null),
        Value::Typed(typed) => match typed.downcast_ref::<T>() {
            Some(inner) => inner.to_representation(),
            None => Err(ConversionError::type_mismatch(std::any::type_name::<T>(), value)),
        },
        other => Err(ConversionError::type_mismatch(std::any::type_name::<T>(), other)),
    })
}

pub(crate) fn parsable_fn<T>() -> ConvertFn
where
    T: Parsable + Any + PartialEq + fmt::Debug + Send + Sync,
{
    Arc::new(|value: &Value| match value {
        Value::Null => Ok(Value::Null),
        other => T::parse(other).map(Value::typed),
    })
}

/// Text marshal: the typed value becomes its `Display` string. Strings are
/// taken to be marshaled already.
pub(crate) fn text_marshal_fn<T>() -> ConvertFn
where
    T: fmt::Display + Any,
{
    Arc::new(|value: &Value| match value {
        Value::Null => Ok(Value::Null),
        Value::String(_) => Ok(value.clone()),
        Value::Typed(typed) => match typed.downcast_ref::<T>() {
            Some(inner) => Ok(Value::String(inner.to_string())),
            None => Err(ConversionError::type_mismatch(std::any::type_name::<T>(), value)),
        },
        other => Err(ConversionError::type_mismatch(std::any::type_name::<T>(), other)),
    })
}

/// Text unmarshal: string input is parsed with `FromStr`; any other input is
/// assumed to be pre-typed by an upstream decode step and passes through.
pub(crate) fn text_unmarshal_fn<T>() -> ConvertFn
where
    T: FromStr + fmt::Display + Any + PartialEq + fmt::Debug + Send + Sync,
    T::Err: fmt::Display,
{
    Arc::new(|value: &Value| match value {
        Value::String(s) => s
            .parse::<T>()
            .map(Value::typed_text)
            .map_err(|e| ConversionError::Parse {
                input: s.clone(),
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            }),
        other => Ok(other.clone()),
    })
}
