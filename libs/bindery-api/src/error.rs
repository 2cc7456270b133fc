use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// A single value could not be converted between wire, internal and
/// storage shapes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("cannot parse {input:?} as {target}: {reason}")]
    Parse {
        input: String,
        target: &'static str,
        reason: String,
    },

    #[error("{0} has no wire representation")]
    NotRepresentable(&'static str),

    #[error("{0}")]
    Message(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    pub fn type_mismatch(expected: &'static str, actual: &Value) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.kind(),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Add context to the error.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self::Context {
            context: ctx.to_string(),
            source: Box::new(self),
        }
    }
}

/// User-input defect: field name -> ordered violation messages.
///
/// Aggregates every field problem of one operation instead of stopping at
/// the first one. Serializes as the bare field map.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("validation failed: {}", summarize(.field_errors))]
pub struct ValidationError {
    field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shortcut: one message for one field.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(name, message);
        err
    }

    pub fn add(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(name.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (name, messages) in other.field_errors {
            self.field_errors.entry(name).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.field_errors
    }

    pub fn messages(&self, name: &str) -> &[String] {
        self.field_errors
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn summarize(field_errors: &BTreeMap<String, Vec<String>>) -> String {
    field_errors
        .iter()
        .map(|(name, messages)| format!("{name}: {}", messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration-time defect, discoverable before serving traffic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistrationError {
    #[error("could not find field `{field}` on entity `{entity}`, known fields: {}", .known.join(", "))]
    UnknownField {
        entity: String,
        field: String,
        known: Vec<String>,
    },

    #[error("entity `{entity}` declares wire name `{field}` more than once")]
    DuplicateField { entity: String, field: String },

    #[error("update of field `{field}` on entity `{entity}` renamed it to `{renamed}`")]
    RenamedField {
        entity: String,
        field: String,
        renamed: String,
    },

    #[error("invalid validation rule `{rule}` for field `{field}`: {reason}")]
    InvalidRule {
        field: String,
        rule: String,
        reason: String,
    },

    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Many(Vec<RegistrationError>),
}

impl RegistrationError {
    /// Fold a batch of problems into one error, `Ok` if there are none.
    pub fn check(mut errors: Vec<RegistrationError>) -> Result<(), RegistrationError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(RegistrationError::Many(errors)),
        }
    }
}

/// An internal value could not be turned into a typed entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to convert internal value to entity `{entity}`: field `{field}`: {source}")]
pub struct EntityError {
    pub entity: String,
    pub field: String,
    pub source: ConversionError,
}

impl EntityError {
    pub fn new(entity: &str, field: &str, source: ConversionError) -> Self {
        Self {
            entity: entity.to_string(),
            field: field.to_string(),
            source,
        }
    }
}

/// Storage-boundary failure, passed through to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{resource} with id `{id}` not found")]
    NotFound { resource: String, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueryError {
    pub fn backend(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(e.into())
    }
}
