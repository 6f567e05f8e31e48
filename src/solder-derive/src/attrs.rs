use syn::{Attribute, Error, Field, Result, Type};

#[derive(Default)]
pub(crate) struct ProvidableAttrs {
    pub many_per_container: bool,
    pub one_per_module: bool,
    pub shared: bool,
    pub expressible: bool,
    pub implements: Vec<Type>,
}

pub(crate) fn parse_providable_attrs(attrs: &[Attribute]) -> Result<ProvidableAttrs> {
    let mut parsed = ProvidableAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("providable") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("many_per_container") {
                parsed.many_per_container = true;
                Ok(())
            } else if meta.path.is_ident("one_per_module") {
                parsed.one_per_module = true;
                Ok(())
            } else if meta.path.is_ident("shared") {
                parsed.shared = true;
                Ok(())
            } else if meta.path.is_ident("expressible") {
                parsed.expressible = true;
                Ok(())
            } else if meta.path.is_ident("implements") {
                let content;
                syn::parenthesized!(content in meta.input);
                while !content.is_empty() {
                    parsed.implements.push(content.parse::<Type>()?);
                    if !content.is_empty() {
                        content.parse::<syn::Token![,]>()?;
                    }
                }
                Ok(())
            } else {
                Err(meta.error("unknown providable attribute"))
            }
        })?;
    }

    if parsed.many_per_container && parsed.one_per_module {
        return Err(Error::new_spanned(
            attrs.first(),
            "a type cannot be both many-per-container and one-per-module",
        ));
    }
    if (parsed.many_per_container || parsed.one_per_module) && !parsed.implements.is_empty() {
        return Err(Error::new_spanned(
            attrs.first(),
            "interface casts only apply to plainly provided types",
        ));
    }
    Ok(parsed)
}

pub(crate) fn field_is_optional(field: &Field) -> Result<bool> {
    let mut optional = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("solder") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("optional") {
                optional = true;
                Ok(())
            } else {
                Err(meta.error("unknown solder attribute"))
            }
        })?;
    }
    Ok(optional)
}
