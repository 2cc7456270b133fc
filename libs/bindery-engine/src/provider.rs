use std::fmt;
use std::sync::Arc;

use bindery_api::converter::passthrough;
use bindery_api::{AttributeDescriptor, Capability, ConversionPair, ConvertFn};

use crate::error::DetectError;
use crate::types::FieldTypeMapper;

/// Which half of a [`ConversionPair`] is being detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// internal value -> wire
    Representation,
    /// wire -> internal value
    InternalValue,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Representation => f.write_str("representation"),
            Direction::InternalValue => f.write_str("internal value"),
        }
    }
}

/// Strategy that supplies a converter for an attribute.
///
/// `Ok(None)` means "not mine, ask the next provider".
pub trait ConversionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_detect(
        &self,
        attr: &AttributeDescriptor,
        direction: Direction,
    ) -> Result<Option<ConvertFn>, DetectError>;
}

/// Converter of a declared capability, if it was declared for the
/// attribute's own type.
fn declared(
    attr: &AttributeDescriptor,
    capability: Option<&Capability>,
) -> Result<Option<ConvertFn>, DetectError> {
    match capability {
        None => Ok(None),
        Some(capability) if !attr.accepts(capability) => Err(DetectError::CapabilityMismatch {
            field: attr.name().to_string(),
            declared: capability.type_name(),
            actual: attr.type_name(),
        }),
        Some(capability) => Ok(Some(capability.convert().clone())),
    }
}

/// The attribute type declares its own conversions
/// (`Representable` outwards, `Parsable` inwards).
#[derive(Debug, Default)]
pub struct RepresentableProvider;

impl ConversionProvider for RepresentableProvider {
    fn name(&self) -> &'static str {
        "representable"
    }

    fn try_detect(
        &self,
        attr: &AttributeDescriptor,
        direction: Direction,
    ) -> Result<Option<ConvertFn>, DetectError> {
        match direction {
            Direction::Representation => declared(attr, attr.representable_capability()),
            Direction::InternalValue => declared(attr, attr.parsable_capability()),
        }
    }
}

/// Converters registered for the attribute type in a [`FieldTypeMapper`].
#[derive(Debug)]
pub struct TypeMapperProvider {
    mapper: Arc<FieldTypeMapper>,
}

impl TypeMapperProvider {
    pub fn new(mapper: Arc<FieldTypeMapper>) -> Self {
        Self { mapper }
    }
}

impl ConversionProvider for TypeMapperProvider {
    fn name(&self) -> &'static str {
        "type-mapper"
    }

    fn try_detect(
        &self,
        attr: &AttributeDescriptor,
        direction: Direction,
    ) -> Result<Option<ConvertFn>, DetectError> {
        Ok(self.mapper.lookup(attr).map(|pair| match direction {
            Direction::Representation => pair.to_representation,
            Direction::InternalValue => pair.to_internal_value,
        }))
    }
}

/// Text marshal fallback: the `Display` string outwards, `FromStr` for
/// string input inwards. Non-string input passes through unchanged, since
/// it may already be typed by an upstream decode step.
#[derive(Debug, Default)]
pub struct TextMarshalProvider;

impl ConversionProvider for TextMarshalProvider {
    fn name(&self) -> &'static str {
        "text-marshal"
    }

    fn try_detect(
        &self,
        attr: &AttributeDescriptor,
        direction: Direction,
    ) -> Result<Option<ConvertFn>, DetectError> {
        match direction {
            Direction::Representation => declared(attr, attr.text_marshal()),
            Direction::InternalValue => declared(attr, attr.text_unmarshal()),
        }
    }
}

/// Ordered providers, first match wins. Each direction is resolved on its
/// own; identity is used when no provider matches.
///
/// Evaluated once per field at registration, never per request.
#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn ConversionProvider>>,
}

impl ProviderChain {
    /// Standard order: representable, type mapper, text marshal.
    pub fn new(mapper: Arc<FieldTypeMapper>) -> Self {
        Self::empty()
            .with_provider(RepresentableProvider)
            .with_provider(TypeMapperProvider::new(mapper))
            .with_provider(TextMarshalProvider)
    }

    /// Chain with no providers: every field is pass-through.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Append a provider with the lowest priority so far.
    pub fn with_provider(mut self, provider: impl ConversionProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn resolve(&self, entity: &str, attr: &AttributeDescriptor) -> ConversionPair {
        ConversionPair::new(
            self.detect(entity, attr, Direction::Representation),
            self.detect(entity, attr, Direction::InternalValue),
        )
    }

    fn detect(&self, entity: &str, attr: &AttributeDescriptor, direction: Direction) -> ConvertFn {
        for provider in &self.providers {
            match provider.try_detect(attr, direction) {
                Ok(Some(convert)) => {
                    tracing::debug!(
                        entity,
                        field = attr.name(),
                        provider = provider.name(),
                        %direction,
                        "conversion detected"
                    );
                    return convert;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        entity,
                        field = attr.name(),
                        provider = provider.name(),
                        %direction,
                        error = %e,
                        "conversion detection failed, skipping provider"
                    );
                }
            }
        }
        passthrough()
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::new(Arc::new(FieldTypeMapper::new()))
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.provider_names())
            .finish()
    }
}
