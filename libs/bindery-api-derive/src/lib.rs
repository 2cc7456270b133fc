use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, LitStr, PathArguments,
    Type,
};

/// Derive macro for storage-backed entity types.
///
/// Generates an `impl bindery_api::Entity` with the attribute schema and the
/// shallow conversions to and from `InternalValue`.
///
/// - `#[entity(name = "...")]` on the struct overrides the entity name
///   (defaults to the struct name).
/// - `#[field(name = "wire")]` tags an attribute. Untagged attributes are not
///   part of the entity and are filled with `Default` when decoding.
/// - capability flags, any combination of `text` (`Display + FromStr`),
///   `representable` and `parsable`. The provider chain picks a converter
///   per direction. `typed` stands alone: no capability, converted through a
///   registered type mapper. Flagged attributes are stored as typed values.
/// - `#[field(flatten)]` inlines the attributes of a nested entity.
///
/// Every attribute type must implement `Default`; tagged attributes must be
/// `Clone`, and capability attributes also `PartialEq + Debug + Send + Sync`.
///
/// # Example
///
/// ```ignore
/// #[derive(Entity, Default)]
/// #[entity(name = "Person")]
/// pub struct Person {
///     #[field(name = "id")]
///     pub id: u64,
///
///     #[field(name = "birthday", text)]
///     pub birthday: Option<chrono::NaiveDate>,
///
///     pub cached_age: u8,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity, field))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct FieldSpec {
    wire_name: Option<String>,
    text: bool,
    representable: bool,
    parsable: bool,
    typed: bool,
    flatten: bool,
}

impl FieldSpec {
    fn has_capability(&self) -> bool {
        self.text || self.representable || self.parsable
    }

    fn is_plain(&self) -> bool {
        !self.has_capability() && !self.typed
    }
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity only supports structs")),
    };

    let mut entity_name = name.to_string();
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                entity_name = value.value();
                Ok(())
            } else {
                Err(meta.error("unknown entity attribute (expected `name`)"))
            }
        })?;
    }

    let mut attribute_tokens = Vec::new();
    let mut encode_tokens = Vec::new();
    let mut decode_tokens = Vec::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_ty = &field.ty;

        let Some(spec) = parse_field_spec(field)? else {
            decode_tokens.push(quote! { #field_name: ::core::default::Default::default() });
            continue;
        };

        if spec.flatten {
            attribute_tokens.push(quote! {
                __attrs.extend(<#field_ty as ::bindery_api::Entity>::attributes());
            });
            encode_tokens.push(quote! {
                __values.extend(::bindery_api::Entity::to_internal_value(&self.#field_name));
            });
            decode_tokens.push(quote! {
                #field_name: <#field_ty as ::bindery_api::Entity>::from_internal_value(__values)?
            });
            continue;
        }

        let wire = spec.wire_name.clone().ok_or_else(|| {
            syn::Error::new_spanned(field_name, "missing #[field(name = \"...\")]")
        })?;
        let inner = option_inner(field_ty);
        let attr_ty = inner.unwrap_or(field_ty);

        let mut descriptor = if inner.is_some() {
            quote! { ::bindery_api::AttributeDescriptor::optional::<#attr_ty>(#wire) }
        } else {
            quote! { ::bindery_api::AttributeDescriptor::of::<#attr_ty>(#wire) }
        };
        if spec.representable {
            descriptor = quote! { #descriptor.representable::<#attr_ty>() };
        }
        if spec.parsable {
            descriptor = quote! { #descriptor.parsable::<#attr_ty>() };
        }
        if spec.text {
            descriptor = quote! { #descriptor.text::<#attr_ty>() };
        }
        attribute_tokens.push(quote! { __attrs.push(#descriptor); });

        // text-capable values carry their text form
        let support = quote! { ::bindery_api::entity::__private };
        let (encode, decode) = match (spec.is_plain(), spec.text, inner.is_some()) {
            (true, _, _) => (
                quote! { ::bindery_api::IntoValue::into_value(::core::clone::Clone::clone(&self.#field_name)) },
                quote! { #support::decode(__values, __ENTITY, #wire)? },
            ),
            (false, true, false) => (
                quote! { #support::encode_text(&self.#field_name) },
                quote! { #support::decode_text::<#attr_ty>(__values, __ENTITY, #wire)? },
            ),
            (false, true, true) => (
                quote! { #support::encode_text_opt(&self.#field_name) },
                quote! { #support::decode_text_opt::<#attr_ty>(__values, __ENTITY, #wire)? },
            ),
            (false, false, false) => (
                quote! { #support::encode_typed(&self.#field_name) },
                quote! { #support::decode_typed::<#attr_ty>(__values, __ENTITY, #wire)? },
            ),
            (false, false, true) => (
                quote! { #support::encode_typed_opt(&self.#field_name) },
                quote! { #support::decode_typed_opt::<#attr_ty>(__values, __ENTITY, #wire)? },
            ),
        };
        encode_tokens.push(quote! { __values.insert(#wire, #encode); });
        decode_tokens.push(quote! { #field_name: #decode });
    }

    Ok(quote! {
        impl ::bindery_api::Entity for #name {
            const NAME: &'static str = #entity_name;

            fn attributes() -> ::std::vec::Vec<::bindery_api::AttributeDescriptor> {
                let mut __attrs = ::std::vec::Vec::new();
                #(#attribute_tokens)*
                __attrs
            }

            fn to_internal_value(&self) -> ::bindery_api::InternalValue {
                let mut __values = ::bindery_api::InternalValue::new();
                #(#encode_tokens)*
                __values
            }

            fn from_internal_value(
                __values: &::bindery_api::InternalValue,
            ) -> ::core::result::Result<Self, ::bindery_api::EntityError> {
                #[allow(dead_code)]
                const __ENTITY: &str = #entity_name;
                ::core::result::Result::Ok(Self {
                    #(#decode_tokens),*
                })
            }
        }
    })
}

/// Parse `#[field(...)]`. `None` means the attribute is not tagged.
fn parse_field_spec(field: &Field) -> Result<Option<FieldSpec>, syn::Error> {
    let mut spec: Option<FieldSpec> = None;

    for attr in &field.attrs {
        if !attr.path().is_ident("field") {
            continue;
        }
        let spec = spec.get_or_insert_with(FieldSpec::default);
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                spec.wire_name = Some(value.value());
            } else if meta.path.is_ident("flatten") {
                spec.flatten = true;
            } else if meta.path.is_ident("text") {
                spec.text = true;
            } else if meta.path.is_ident("representable") {
                spec.representable = true;
            } else if meta.path.is_ident("parsable") {
                spec.parsable = true;
            } else if meta.path.is_ident("typed") {
                spec.typed = true;
            } else {
                return Err(meta.error(
                    "unknown field attribute (expected name, flatten, text, representable, parsable or typed)",
                ));
            }
            Ok(())
        })?;
    }

    if let Some(spec) = &spec {
        if spec.flatten && (spec.wire_name.is_some() || !spec.is_plain()) {
            return Err(syn::Error::new_spanned(
                field,
                "#[field(flatten)] cannot be combined with other field attributes",
            ));
        }
        if spec.typed && spec.has_capability() {
            return Err(syn::Error::new_spanned(
                field,
                "`typed` cannot be combined with text, representable or parsable",
            ));
        }
    }

    Ok(spec)
}

/// `T` for a type written as `Option<T>` (any path ending in `Option`).
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}
