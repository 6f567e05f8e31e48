use syn::{GenericArgument, Path, PathArguments, PathSegment, ReturnType, Type};

use crate::codegen::filegen::FileGen;
use crate::codegen::{CodegenError, UnnameableTypeSnafu};

/// Parses a runtime type name into a type expression, routing every module
/// path through the file's import aliases. `alloc`/`core` prefixes are
/// normalized to `std`, and this crate's own types are addressed through
/// their crate-root re-exports.
pub(crate) fn rewrite_type(gen: &mut FileGen, name: &str) -> Result<Type, CodegenError> {
    if name.contains("{{") {
        return UnnameableTypeSnafu { name }.fail();
    }
    let mut ty: Type = syn::parse_str(name).map_err(|_| UnnameableTypeSnafu { name }.build())?;
    rewrite_in_type(gen, &mut ty)?;
    Ok(ty)
}

/// Parses a factory's path for use in call position; generic arguments on
/// the final segment become turbofish.
pub(crate) fn rewrite_fn_path(gen: &mut FileGen, name: &str) -> Result<Path, CodegenError> {
    if name.contains("{{") {
        return UnnameableTypeSnafu { name }.fail();
    }
    let mut path: Path = syn::parse_str(name).map_err(|_| UnnameableTypeSnafu { name }.build())?;
    rewrite_path(gen, &mut path)?;
    if let Some(last) = path.segments.last_mut() {
        if let PathArguments::AngleBracketed(args) = &mut last.arguments {
            args.colon2_token = Some(Default::default());
        }
    }
    Ok(path)
}

fn rewrite_in_type(gen: &mut FileGen, ty: &mut Type) -> Result<(), CodegenError> {
    match ty {
        Type::Path(type_path) => rewrite_path(gen, &mut type_path.path),
        Type::Reference(reference) => rewrite_in_type(gen, &mut reference.elem),
        Type::Slice(slice) => rewrite_in_type(gen, &mut slice.elem),
        Type::Array(array) => rewrite_in_type(gen, &mut array.elem),
        Type::Ptr(ptr) => rewrite_in_type(gen, &mut ptr.elem),
        Type::Paren(paren) => rewrite_in_type(gen, &mut paren.elem),
        Type::Group(group) => rewrite_in_type(gen, &mut group.elem),
        Type::Tuple(tuple) => {
            for elem in &mut tuple.elems {
                rewrite_in_type(gen, elem)?;
            }
            Ok(())
        }
        Type::TraitObject(object) => {
            for bound in &mut object.bounds {
                if let syn::TypeParamBound::Trait(bound) = bound {
                    rewrite_path(gen, &mut bound.path)?;
                }
            }
            Ok(())
        }
        Type::BareFn(function) => {
            for input in &mut function.inputs {
                rewrite_in_type(gen, &mut input.ty)?;
            }
            if let ReturnType::Type(_, output) = &mut function.output {
                rewrite_in_type(gen, output)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn rewrite_path(gen: &mut FileGen, path: &mut Path) -> Result<(), CodegenError> {
    for segment in path.segments.iter_mut() {
        if let PathArguments::AngleBracketed(args) = &mut segment.arguments {
            for arg in &mut args.args {
                if let GenericArgument::Type(ty) = arg {
                    rewrite_in_type(gen, ty)?;
                }
            }
        }
    }
    if path.segments.len() <= 1 {
        return Ok(());
    }

    let last = match path.segments.last() {
        Some(segment) => segment.clone(),
        None => return Ok(()),
    };
    let mut modules: Vec<String> = path
        .segments
        .iter()
        .take(path.segments.len() - 1)
        .map(|segment| segment.ident.to_string())
        .collect();
    if modules[0] == "alloc" || modules[0] == "core" {
        modules[0] = String::from("std");
    }

    let head: PathSegment = if modules[0] == env!("CARGO_PKG_NAME") {
        // This crate re-exports its public types at the crate root.
        PathSegment {
            ident: syn::Ident::new(&modules[0], proc_macro2::Span::call_site()),
            arguments: PathArguments::None,
        }
    } else {
        PathSegment {
            ident: gen.alias_for(&modules.join("::")),
            arguments: PathArguments::None,
        }
    };

    let mut segments = syn::punctuated::Punctuated::new();
    segments.push(head);
    segments.push(last);
    path.leading_colon = None;
    path.segments = segments;
    Ok(())
}

#[cfg(test)]
mod tests {
    use quote::ToTokens;

    use super::*;

    fn render(ty: &Type) -> String {
        ty.to_token_stream().to_string().replace(' ', "")
    }

    #[test]
    fn rewrite_type_aliases_module_paths() {
        let mut gen = FileGen::new();
        let ty = rewrite_type(&mut gen, "alloc::string::String").unwrap();
        assert_eq!(render(&ty), "string::String");
    }

    #[test]
    fn rewrite_type_recurses_into_generics() {
        let mut gen = FileGen::new();
        let ty = rewrite_type(&mut gen, "alloc::vec::Vec<alloc::string::String>").unwrap();
        assert_eq!(render(&ty), "vec::Vec<string::String>");
    }

    #[test]
    fn rewrite_type_keeps_primitives_bare() {
        let mut gen = FileGen::new();
        let ty = rewrite_type(&mut gen, "i32").unwrap();
        assert_eq!(render(&ty), "i32");
    }

    #[test]
    fn rewrite_type_fails_for_closures() {
        let mut gen = FileGen::new();
        let err = rewrite_type(&mut gen, "app::main::{{closure}}").unwrap_err();
        assert!(matches!(err, CodegenError::UnnameableType { .. }));
    }

    #[test]
    fn rewrite_fn_path_turbofishes_generics() {
        let mut gen = FileGen::new();
        let path = rewrite_fn_path(&mut gen, "app::factory<i32>").unwrap();
        assert_eq!(
            path.to_token_stream().to_string().replace(' ', ""),
            "app::factory::<i32>"
        );
    }
}
