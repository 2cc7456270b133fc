use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::converter::{
    parsable_fn, representable_fn, text_marshal_fn, text_unmarshal_fn, ConvertFn, Parsable,
    Representable,
};
use crate::error::RegistrationError;

/// A conversion an attribute type declares about itself, tagged with the
/// type it was declared for.
#[derive(Clone)]
pub struct Capability {
    convert: ConvertFn,
    type_id: TypeId,
    type_name: &'static str,
}

impl Capability {
    fn of<T: Any>(convert: ConvertFn) -> Self {
        Self {
            convert,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn convert(&self) -> &ConvertFn {
        &self.convert
    }

    /// Type the capability was declared for.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// One tagged attribute of an entity type.
///
/// - `name`: wire-visible identifier
/// - `type_id` / `type_name`: the attribute's Rust type (the inner `T` for
///   `Option<T>` attributes, which are flagged `nullable`)
/// - capabilities: conversions the type declares about itself. The provider
///   chain reads them at registration time and skips any declared for
///   another type.
#[derive(Clone)]
pub struct AttributeDescriptor {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    nullable: bool,
    representable: Option<Capability>,
    parsable: Option<Capability>,
    text: Option<(Capability, Capability)>,
}

impl AttributeDescriptor {
    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            nullable: false,
            representable: None,
            parsable: None,
            text: None,
        }
    }

    /// Attribute declared as `Option<T>`.
    pub fn optional<T: Any>(name: impl Into<String>) -> Self {
        Self {
            nullable: true,
            ..Self::of::<T>(name)
        }
    }

    /// `T` implements [`Representable`].
    pub fn representable<T>(mut self) -> Self
    where
        T: Representable + Any,
    {
        self.representable = Some(Capability::of::<T>(representable_fn::<T>()));
        self
    }

    /// `T` implements [`Parsable`].
    pub fn parsable<T>(mut self) -> Self
    where
        T: Parsable + Any + PartialEq + fmt::Debug + Send + Sync,
    {
        self.parsable = Some(Capability::of::<T>(parsable_fn::<T>()));
        self
    }

    /// `T` marshals to and from text (`Display` + `FromStr`).
    pub fn text<T>(mut self) -> Self
    where
        T: FromStr + fmt::Display + Any + PartialEq + fmt::Debug + Send + Sync,
        T::Err: fmt::Display,
    {
        self.text = Some((
            Capability::of::<T>(text_marshal_fn::<T>()),
            Capability::of::<T>(text_unmarshal_fn::<T>()),
        ));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_type<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// `capability` was declared for this attribute's type.
    pub fn accepts(&self, capability: &Capability) -> bool {
        capability.type_id == self.type_id
    }

    pub fn representable_capability(&self) -> Option<&Capability> {
        self.representable.as_ref()
    }

    pub fn parsable_capability(&self) -> Option<&Capability> {
        self.parsable.as_ref()
    }

    pub fn text_marshal(&self) -> Option<&Capability> {
        self.text.as_ref().map(|(marshal, _)| marshal)
    }

    pub fn text_unmarshal(&self) -> Option<&Capability> {
        self.text.as_ref().map(|(_, unmarshal)| unmarshal)
    }

    /// Rust type as written on the entity, e.g. `Option<alloc::string::String>`.
    pub fn declared_type(&self) -> String {
        if self.nullable {
            format!("Option<{}>", self.type_name)
        } else {
            self.type_name.to_string()
        }
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("type", &self.declared_type())
            .field("representable", &self.representable.is_some())
            .field("parsable", &self.parsable.is_some())
            .field("text", &self.text.is_some())
            .finish()
    }
}

/// Validated attribute set of one entity type.
///
/// Attribute order is declaration order; wire names are unique.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    entity: &'static str,
    attributes: Vec<AttributeDescriptor>,
}

impl EntitySchema {
    pub fn new(
        entity: &'static str,
        attributes: Vec<AttributeDescriptor>,
    ) -> Result<Self, RegistrationError> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        for attr in &attributes {
            if !seen.insert(attr.name()) {
                errors.push(RegistrationError::DuplicateField {
                    entity: entity.to_string(),
                    field: attr.name().to_string(),
                });
            }
        }
        RegistrationError::check(errors)?;
        Ok(Self { entity, attributes })
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(AttributeDescriptor::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn duplicate_wire_names_are_rejected() {
        let err = EntitySchema::new(
            "Person",
            vec![
                AttributeDescriptor::of::<u64>("id"),
                AttributeDescriptor::of::<String>("id"),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateField {
                entity: "Person".into(),
                field: "id".into(),
            }
        );
    }

    #[test]
    fn optional_attributes_use_the_inner_type() {
        let attr = AttributeDescriptor::optional::<String>("nickname");
        assert!(attr.is_type::<String>());
        assert!(attr.is_nullable());
        assert_eq!(attr.declared_type(), format!("Option<{}>", std::any::type_name::<String>()));
    }

    #[test]
    fn text_capability_is_recorded() {
        let attr = AttributeDescriptor::of::<u32>("port").text::<u32>();
        let marshal = attr.text_marshal().unwrap();
        assert!(attr.accepts(marshal));
        assert_eq!(
            (marshal.convert())(&Value::typed_text(8080u32)).unwrap(),
            Value::from("8080")
        );
        assert!(attr.representable_capability().is_none());
    }

    #[test]
    fn capabilities_remember_their_type() {
        let attr = AttributeDescriptor::of::<u32>("port").text::<u16>();
        let marshal = attr.text_marshal().unwrap();
        assert!(!attr.accepts(marshal));
        assert_eq!(marshal.type_name(), "u16");
    }

    #[test]
    fn lookup_by_name() {
        let schema = EntitySchema::new(
            "Person",
            vec![
                AttributeDescriptor::of::<u64>("id"),
                AttributeDescriptor::of::<String>("name"),
            ],
        )
        .unwrap();
        assert_eq!(schema.names(), vec!["id", "name"]);
        assert!(schema.attribute("name").unwrap().is_type::<String>());
        assert!(schema.attribute("missing").is_none());
    }
}
