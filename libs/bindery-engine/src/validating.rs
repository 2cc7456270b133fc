use std::collections::BTreeMap;
use std::fmt;

use bindery_api::{Context, InternalValue, RegistrationError, ValidationError, Value, WireMap};

use crate::error::SerializerError;
use crate::serializer::Serializer;

/// Checks an internal value after conversion.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &InternalValue, ctx: &Context) -> Result<(), ValidationError>;
}

/// Wraps a serializer with a [`Validator`].
///
/// Validation problems are merged into the serializer's own
/// [`ValidationError`], so one response carries every problem of the input.
pub struct ValidatingSerializer<S, V> {
    inner: S,
    validator: V,
}

impl<S: Serializer, V: Validator> ValidatingSerializer<S, V> {
    pub fn new(inner: S, validator: V) -> Self {
        Self { inner, validator }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Serializer, V: Validator> Serializer for ValidatingSerializer<S, V> {
    fn to_internal_value(&self, raw: &WireMap, ctx: &Context) -> Result<InternalValue, SerializerError> {
        match self.inner.to_internal_value(raw, ctx) {
            Ok(value) => {
                self.validator.validate(&value, ctx)?;
                Ok(value)
            }
            Err(SerializerError::Validation(mut errors)) => {
                // Run the rules over the raw input of known fields so the
                // caller sees rule violations next to conversion problems.
                let known = self.inner.field_names();
                let raw_known: InternalValue = InternalValue::from_wire(raw)
                    .into_iter()
                    .filter(|(key, _)| known.contains(key) && !errors.field_errors().contains_key(key))
                    .collect();
                if let Err(rule_errors) = self.validator.validate(&raw_known, ctx) {
                    for (field, messages) in rule_errors.field_errors() {
                        if errors.field_errors().contains_key(field) {
                            continue;
                        }
                        for message in messages {
                            errors.add(field.clone(), message.clone());
                        }
                    }
                }
                Err(SerializerError::Validation(errors))
            }
            Err(e) => Err(e),
        }
    }

    fn to_representation(&self, value: &InternalValue, ctx: &Context) -> Result<WireMap, SerializerError> {
        self.inner.to_representation(value, ctx)
    }

    fn from_db(&self, row: &InternalValue, ctx: &Context) -> Result<InternalValue, SerializerError> {
        self.inner.from_db(row, ctx)
    }

    fn validate(&self, value: &InternalValue, ctx: &Context) -> Result<(), SerializerError> {
        self.inner.validate(value, ctx)?;
        self.validator.validate(value, ctx)?;
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }
}

// ---------------------------------------------------------------------------
// RuleValidator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Required,
    Min(f64),
    Max(f64),
    Len(f64),
    OneOf(Vec<String>),
    Email,
}

impl Rule {
    fn parse(field: &str, spec: &str) -> Result<Self, RegistrationError> {
        let invalid = |reason: &str| RegistrationError::InvalidRule {
            field: field.to_string(),
            rule: spec.to_string(),
            reason: reason.to_string(),
        };
        let (name, arg) = match spec.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (spec.trim(), None),
        };
        let number = |arg: Option<&str>| -> Result<f64, RegistrationError> {
            let arg = arg.ok_or_else(|| invalid("missing numeric argument"))?;
            match arg.parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
                _ => Err(invalid("argument must be a non-negative number")),
            }
        };
        match (name, arg) {
            ("required", None) => Ok(Rule::Required),
            ("email", None) => Ok(Rule::Email),
            ("min", arg) => number(arg).map(Rule::Min),
            ("max", arg) => number(arg).map(Rule::Max),
            ("len", arg) => number(arg).map(Rule::Len),
            ("oneof", Some(arg)) => {
                let options: Vec<String> = arg.split_whitespace().map(str::to_string).collect();
                if options.is_empty() {
                    return Err(invalid("expected at least one option"));
                }
                Ok(Rule::OneOf(options))
            }
            ("required" | "email", Some(_)) => Err(invalid("rule takes no argument")),
            ("oneof", None) => Err(invalid("missing options")),
            _ => Err(invalid("unknown rule")),
        }
    }

    /// Violation message for `value`, if any. `Null` only fails `required`.
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            Rule::Required => value.is_empty().then(|| "This field is required".to_string()),
            _ if value.is_null() => None,
            Rule::Min(min) => {
                let (size, unit) = measure(value)?;
                (size < *min).then(|| match unit {
                    Unit::Value => format!("Ensure this value is greater than or equal to {min}"),
                    unit => format!("Ensure this field has at least {min} {unit}"),
                })
            }
            Rule::Max(max) => {
                let (size, unit) = measure(value)?;
                (size > *max).then(|| match unit {
                    Unit::Value => format!("Ensure this value is less than or equal to {max}"),
                    unit => format!("Ensure this field has no more than {max} {unit}"),
                })
            }
            Rule::Len(len) => {
                let (size, unit) = measure(value)?;
                (size != *len).then(|| match unit {
                    Unit::Value => format!("Ensure this value is equal to {len}"),
                    unit => format!("Ensure this field has exactly {len} {unit}"),
                })
            }
            Rule::OneOf(options) => {
                let key = value.as_key();
                let accepted = key.as_deref().is_some_and(|k| options.iter().any(|o| o == k));
                (!accepted).then(|| format!("Must be one of: {}", options.join(", ")))
            }
            Rule::Email => {
                let valid = value.as_str().is_some_and(looks_like_email);
                (!valid).then(|| "Enter a valid email address".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Characters,
    Items,
    Value,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Characters => f.write_str("characters"),
            Unit::Items => f.write_str("items"),
            Unit::Value => f.write_str("value"),
        }
    }
}

/// Characters of a string, elements of a collection, or the number itself.
fn measure(value: &Value) -> Option<(f64, Unit)> {
    match value {
        Value::String(s) => Some((s.chars().count() as f64, Unit::Characters)),
        Value::Bytes(b) => Some((b.len() as f64, Unit::Items)),
        Value::Array(items) => Some((items.len() as f64, Unit::Items)),
        Value::Map(entries) => Some((entries.len() as f64, Unit::Items)),
        Value::Typed(t) => t.text().map(|s| (s.chars().count() as f64, Unit::Characters)),
        other => other.as_f64().map(|n| (n, Unit::Value)),
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !s.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Validator configured with one rule spec per field, e.g.
/// `name = "required,min=2"`.
///
/// Rules: `required`, `min=N`, `max=N`, `len=N`, `oneof=a b c`, `email`.
/// For partial updates `required` only rejects values that are present
/// but empty.
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: BTreeMap<String, Vec<Rule>>,
}

impl RuleValidator {
    /// Parse `config` against the serializer's field names. Every bad rule
    /// and every unknown field is reported.
    pub fn new<I, K, V>(config: I, known_fields: &[String]) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut rules = BTreeMap::new();
        let mut errors = Vec::new();
        for (field, spec) in config {
            let field: String = field.into();
            if !known_fields.contains(&field) {
                errors.push(RegistrationError::UnknownField {
                    entity: "validation".to_string(),
                    field: field.clone(),
                    known: known_fields.to_vec(),
                });
                continue;
            }
            let mut parsed = Vec::new();
            for part in spec.as_ref().split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match Rule::parse(&field, part) {
                    Ok(rule) => parsed.push(rule),
                    Err(e) => errors.push(e),
                }
            }
            rules.insert(field, parsed);
        }
        RegistrationError::check(errors)?;
        Ok(Self { rules })
    }

    /// Rules checked against the fields of `serializer`.
    pub fn for_serializer<I, K, V>(config: I, serializer: &dyn Serializer) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        Self::new(config, &serializer.field_names())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}

impl Validator for RuleValidator {
    fn validate(&self, value: &InternalValue, ctx: &Context) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        for (field, rules) in &self.rules {
            let current = match value.get(field) {
                Some(v) => v,
                // absent from a partial update: nothing to check
                None if ctx.is_partial() => continue,
                None => &Value::Null,
            };
            for rule in rules {
                if let Some(message) = rule.check(current) {
                    errors.add(field.clone(), message);
                }
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(config: &[(&str, &str)]) -> RuleValidator {
        let known: Vec<String> = ["name", "age", "email", "tags", "role"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        RuleValidator::new(config.iter().copied(), &known).unwrap()
    }

    #[test]
    fn required_rejects_absent_and_empty() {
        let v = validator(&[("name", "required")]);
        let ctx = Context::new();
        let err = v.validate(&InternalValue::new(), &ctx).unwrap_err();
        assert_eq!(err.messages("name"), ["This field is required"]);
        assert!(v.validate(&InternalValue::new().with("name", ""), &ctx).is_err());
        assert!(v.validate(&InternalValue::new().with("name", "John"), &ctx).is_ok());
    }

    #[test]
    fn partial_updates_only_check_present_fields() {
        let v = validator(&[("name", "required,min=2")]);
        let ctx = Context::new().with_partial(true);
        assert!(v.validate(&InternalValue::new(), &ctx).is_ok());
        let err = v
            .validate(&InternalValue::new().with("name", Value::Null), &ctx)
            .unwrap_err();
        assert_eq!(err.messages("name"), ["This field is required"]);
    }

    #[test]
    fn size_rules_measure_by_kind() {
        let v = validator(&[("name", "min=2,max=4"), ("age", "min=18"), ("tags", "len=2")]);
        let ctx = Context::new();
        let input = InternalValue::new()
            .with("name", "Jonathan")
            .with("age", 12)
            .with("tags", Value::Array(vec![Value::from("a")]));
        let err = v.validate(&input, &ctx).unwrap_err();
        assert_eq!(err.messages("name"), ["Ensure this field has no more than 4 characters"]);
        assert_eq!(err.messages("age"), ["Ensure this value is greater than or equal to 18"]);
        assert_eq!(err.messages("tags"), ["Ensure this field has exactly 2 items"]);
    }

    #[test]
    fn oneof_and_email() {
        let v = validator(&[("role", "oneof=admin user"), ("email", "email")]);
        let ctx = Context::new();
        let ok = InternalValue::new().with("role", "user").with("email", "john@example.com");
        assert!(v.validate(&ok, &ctx).is_ok());

        let bad = InternalValue::new().with("role", "root").with("email", "john@");
        let err = v.validate(&bad, &ctx).unwrap_err();
        assert_eq!(err.messages("role"), ["Must be one of: admin, user"]);
        assert_eq!(err.messages("email"), ["Enter a valid email address"]);
    }

    #[test]
    fn optional_rules_skip_null() {
        let v = validator(&[("email", "email")]);
        let input = InternalValue::new().with("email", Value::Null);
        assert!(v.validate(&input, &Context::new()).is_ok());
    }

    #[test]
    fn bad_configuration_is_reported_at_once() {
        let known = vec!["name".to_string()];
        let err = RuleValidator::new([("name", "required,maybe"), ("nick", "required")], &known)
            .unwrap_err();
        let errors = match err {
            RegistrationError::Many(errors) => errors,
            other => panic!("expected several errors, got {other:?}"),
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], RegistrationError::InvalidRule { ref rule, .. } if rule == "maybe"));
        assert!(matches!(errors[1], RegistrationError::UnknownField { ref field, .. } if field == "nick"));
    }

    #[test]
    fn rule_arguments_are_checked() {
        assert!(Rule::parse("name", "min=abc").is_err());
        assert!(Rule::parse("name", "min").is_err());
        assert!(Rule::parse("name", "required=1").is_err());
        assert_eq!(Rule::parse("name", " max = 3 ").unwrap(), Rule::Max(3.0));
    }
}
