use std::collections::BTreeMap;

use syn::{parse_quote, Expr, Ident, ItemUse, Path, Type};

use crate::codegen::ident::IdentAllocator;
use crate::codegen::{types, CodegenError, UnnameableTypeSnafu};
use crate::key::TypeKey;
use crate::provider::Location;

/// Owns the generated file's imports and file-level identifiers.
///
/// Every multi-segment module path is imported once and referenced through
/// an alias: the path's trailing segment, disambiguated with a numeric
/// suffix when two paths end alike.
pub struct FileGen {
    aliases: BTreeMap<String, Ident>,
    idents: IdentAllocator,
}

impl FileGen {
    pub(crate) fn new() -> Self {
        Self {
            aliases: BTreeMap::new(),
            idents: IdentAllocator::new(),
        }
    }

    /// The alias a module path is imported under, allocating on first use.
    pub fn alias_for(&mut self, module_path: &str) -> Ident {
        if let Some(alias) = self.aliases.get(module_path) {
            return alias.clone();
        }
        let tail = module_path.rsplit("::").next().unwrap_or(module_path);
        let alias = self.idents.create(tail);
        self.aliases.insert(module_path.to_owned(), alias.clone());
        alias
    }

    /// The type expression for a registered type, importing as needed.
    pub fn type_expr(&mut self, key: TypeKey) -> Result<Type, CodegenError> {
        types::rewrite_type(self, key.name())
    }

    /// The callable path of a provider's factory.
    pub(crate) fn fn_path(&mut self, location: &Location) -> Result<Path, CodegenError> {
        types::rewrite_fn_path(self, location.name())
    }

    /// A composite literal `Path { field: expr, .. }` for struct-in sugar.
    pub fn struct_literal(
        &mut self,
        key: TypeKey,
        fields: Vec<(&str, Expr)>,
    ) -> Result<Expr, CodegenError> {
        let ty = self.type_expr(key)?;
        let Type::Path(type_path) = ty else {
            return UnnameableTypeSnafu { name: key.name() }.fail();
        };
        let path = crate::codegen::values::path_without_args(&Type::Path(type_path));
        let names: Vec<Ident> = fields
            .iter()
            .map(|(name, _)| Ident::new(name, proc_macro2::Span::call_site()))
            .collect();
        let exprs: Vec<&Expr> = fields.iter().map(|(_, expr)| expr).collect();
        Ok(parse_quote!(#path { #(#names: #exprs),* }))
    }

    pub(crate) fn idents(&self) -> &IdentAllocator {
        &self.idents
    }

    /// The `use` items for everything aliased so far, sorted by path.
    pub(crate) fn use_items(&self) -> Vec<ItemUse> {
        self.aliases
            .iter()
            .map(|(module_path, alias)| {
                let path: Path = syn::parse_str(module_path)
                    .unwrap_or_else(|_| unreachable!("aliased paths should parse"));
                let tail = module_path.rsplit("::").next().unwrap_or(module_path);
                if alias.to_string() == tail {
                    parse_quote!(use #path;)
                } else {
                    parse_quote!(use #path as #alias;)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use quote::ToTokens;

    use super::*;

    #[test]
    fn alias_for_reuses_existing_aliases() {
        let mut gen = FileGen::new();
        let first = gen.alias_for("app::db");
        let second = gen.alias_for("app::db");
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "db");
    }

    #[test]
    fn alias_for_disambiguates_colliding_tails() {
        let mut gen = FileGen::new();
        assert_eq!(gen.alias_for("app::db").to_string(), "db");
        assert_eq!(gen.alias_for("other::db").to_string(), "db2");
    }

    #[test]
    fn use_items_render_aliases_only_when_needed() {
        let mut gen = FileGen::new();
        gen.alias_for("app::db");
        gen.alias_for("other::db");

        let rendered: Vec<String> = gen
            .use_items()
            .iter()
            .map(|item| item.to_token_stream().to_string().replace(' ', ""))
            .collect();
        assert_eq!(rendered, vec!["useapp::db;", "useother::dbasdb2;"]);
    }

    #[test]
    fn struct_literal_builds_a_composite() {
        let mut gen = FileGen::new();
        let expr = gen
            .struct_literal(
                TypeKey::of::<String>(),
                vec![("len", parse_quote!(v1.clone()))],
            )
            .unwrap();
        assert_eq!(
            expr.to_token_stream().to_string().replace(' ', ""),
            "string::String{len:v1.clone()}"
        );
    }
}
