use syn::{parse_quote, Expr, Path, PathArguments, Type};

/// The expression consumers use to take their own copy of a bound value.
pub fn clone_expr(expr: &Expr) -> Expr {
    parse_quote!(#expr.clone())
}

/// The zero-value expression emitted for an absent optional input.
pub fn default_expr() -> Expr {
    parse_quote!(Default::default())
}

/// Strips generic arguments so a type can be used in constructor position,
/// e.g. `btree_map::BTreeMap<String, T>` → `btree_map::BTreeMap`.
pub(crate) fn path_without_args(ty: &Type) -> Path {
    match ty {
        Type::Path(type_path) => {
            let mut path = type_path.path.clone();
            if let Some(last) = path.segments.last_mut() {
                last.arguments = PathArguments::None;
            }
            path
        }
        _ => unreachable!("constructor types should be path types"),
    }
}

#[cfg(test)]
mod tests {
    use quote::ToTokens;

    use super::*;

    #[test]
    fn clone_expr_wraps_the_receiver() {
        let expr: Expr = parse_quote!(v1);
        assert_eq!(clone_expr(&expr).to_token_stream().to_string(), "v1 . clone ()");
    }

    #[test]
    fn path_without_args_strips_generics() {
        let ty: Type = parse_quote!(collections::BTreeMap<String, i32>);
        let path = path_without_args(&ty);
        assert_eq!(
            path.to_token_stream().to_string().replace(' ', ""),
            "collections::BTreeMap"
        );
    }
}
