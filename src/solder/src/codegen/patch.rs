use quote::ToTokens;
use syn::{Block, Expr, Item, ItemUse, Stmt, UseTree};

use crate::codegen::{BadCodegenTargetSnafu, BadImportSnafu, CodegenError};

/// Rewrites an existing source file: the named function's body, which must
/// be exactly one call to the library's entry point, is replaced with the
/// generated statements, and the file gains the generated imports.
pub(crate) fn apply(
    source: &str,
    function: &str,
    block: &Block,
    uses: &[ItemUse],
) -> Result<String, CodegenError> {
    let mut file = syn::parse_file(source).map_err(|err| {
        BadCodegenTargetSnafu {
            function,
            reason: format!("the target source does not parse: {err}"),
        }
        .build()
    })?;

    for item in &file.items {
        if let Item::Use(item_use) = item {
            if has_glob(&item_use.tree) {
                return BadImportSnafu {
                    import: item_use.to_token_stream().to_string(),
                }
                .fail();
            }
        }
    }

    let existing: Vec<String> = file
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Use(item_use) => Some(item_use.to_token_stream().to_string()),
            _ => None,
        })
        .collect();

    let Some(target) = file.items.iter_mut().find_map(|item| match item {
        Item::Fn(function_item) if function_item.sig.ident == function => Some(function_item),
        _ => None,
    }) else {
        return BadCodegenTargetSnafu {
            function,
            reason: "the target function was not found",
        }
        .fail();
    };

    let valid = match target.block.stmts.as_slice() {
        [Stmt::Expr(expr, _)] => is_entry_call(expr),
        _ => false,
    };
    if !valid {
        return BadCodegenTargetSnafu {
            function,
            reason: "the body must be exactly one call to the injection entry point",
        }
        .fail();
    }
    target.block = Box::new(block.clone());

    let insert_at = file
        .items
        .iter()
        .rposition(|item| matches!(item, Item::Use(_)))
        .map(|pos| pos + 1)
        .unwrap_or(0);
    for (offset, item_use) in uses
        .iter()
        .filter(|item_use| !existing.contains(&item_use.to_token_stream().to_string()))
        .enumerate()
    {
        file.items.insert(insert_at + offset, Item::Use(item_use.clone()));
    }

    Ok(prettyplease::unparse(&file))
}

fn is_entry_call(expr: &Expr) -> bool {
    match expr {
        Expr::Try(inner) => is_entry_call(&inner.expr),
        Expr::Call(call) => match call.func.as_ref() {
            Expr::Path(path) => path
                .path
                .segments
                .last()
                .is_some_and(|segment| {
                    let name = segment.ident.to_string();
                    name == "inject" || name == "generate"
                }),
            _ => false,
        },
        Expr::MethodCall(call) => {
            let name = call.method.to_string();
            (name == "unwrap" || name == "expect") && is_entry_call(&call.receiver)
        }
        _ => false,
    }
}

fn has_glob(tree: &UseTree) -> bool {
    match tree {
        UseTree::Glob(_) => true,
        UseTree::Path(path) => has_glob(&path.tree),
        UseTree::Group(group) => group.items.iter().any(has_glob),
        UseTree::Name(_) | UseTree::Rename(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    fn generated_block() -> Block {
        parse_quote!({
            let v1 = app::one();
            Ok(v1)
        })
    }

    #[test]
    fn apply_succeeds_for_a_single_entry_call() {
        let source = "fn build_app() -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {\n    solder::inject(app::config(), &mut out)\n}\n";
        let patched = apply(source, "build_app", &generated_block(), &[]).unwrap();

        assert!(patched.contains("app::one()"));
        assert!(!patched.contains("solder::inject"));
    }

    #[test]
    fn apply_fails_when_function_is_missing() {
        let err = apply("fn other() {}", "build_app", &generated_block(), &[]).unwrap_err();
        assert!(matches!(err, CodegenError::BadCodegenTarget { .. }));
    }

    #[test]
    fn apply_fails_when_body_has_extra_statements() {
        let source = "fn build_app() {\n    let x = 1;\n    solder::inject(app::config(), &mut out);\n}\n";
        let err = apply(source, "build_app", &generated_block(), &[]).unwrap_err();
        assert!(matches!(err, CodegenError::BadCodegenTarget { .. }));
    }

    #[test]
    fn apply_fails_for_glob_imports() {
        let source = "use app::*;\nfn build_app() {\n    solder::inject(app::config(), &mut out)\n}\n";
        let err = apply(source, "build_app", &generated_block(), &[]).unwrap_err();
        assert!(matches!(err, CodegenError::BadImport { .. }));
    }
}
