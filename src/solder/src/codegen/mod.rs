mod filegen;
mod ident;
mod patch;
mod types;
mod values;

use std::io::Write;

use snafu::prelude::*;
use syn::{parse_quote, Ident, Stmt, Type};

pub use syn::Expr;

use crate::config::Config;
use crate::container::registry::Registry;
use crate::container::solver::Solver;
use crate::container::OutputTargets;
use crate::error::Error;
use crate::key::{ModuleKeyContext, TypeKey};
use crate::provider::{Location, Providable};

pub use filegen::FileGen;
pub use values::{clone_expr, default_expr};

pub(crate) use ident::{ident_prefix, IdentAllocator};
pub(crate) use values::path_without_args;

/// Errors raised while emitting source code.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum CodegenError {
    #[snafu(display("a value of type {type_name} has no literal form"))]
    #[non_exhaustive]
    UnrepresentableValue { type_name: &'static str },

    #[snafu(display("the target file carries a glob import ({import}), which emitted aliases could shadow"))]
    #[non_exhaustive]
    BadImport { import: String },

    #[snafu(display("function {function} is not a valid codegen target: {reason}"))]
    #[non_exhaustive]
    BadCodegenTarget { function: String, reason: String },

    #[snafu(display("{name} has no nameable form in generated code"))]
    #[non_exhaustive]
    UnnameableType { name: String },

    #[snafu(display("could not write the generated source to the sink"))]
    #[non_exhaustive]
    Sink { source: std::io::Error },
}

/// Options for one code-emission run: the generated function's name, its
/// pre-bound parameters, and optionally an existing file to patch.
pub struct CodegenOptions {
    pub(crate) function_name: String,
    pub(crate) params: Vec<(String, TypeKey)>,
    pub(crate) patch_source: Option<String>,
}

impl CodegenOptions {
    pub fn new(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_owned(),
            params: Vec::new(),
            patch_source: None,
        }
    }

    /// Declares a parameter of the generated function. A supplied value of
    /// the same type is referenced through the parameter instead of being
    /// rendered as a literal.
    pub fn param<T: Providable>(mut self, name: &str) -> Self {
        self.params.push((name.to_owned(), T::key()));
        self
    }

    /// Patches `function_name` inside existing source instead of emitting
    /// a fresh file. The target's body must be exactly one call to the
    /// injection entry point; its signature is kept.
    pub fn patch_source(mut self, source: &str) -> Self {
        self.patch_source = Some(source.to_owned());
        self
    }
}

struct Param {
    ident: Ident,
    key: TypeKey,
    ty: Type,
}

/// Accumulates the generated function while the solver walks the graph.
pub struct FuncGen {
    pub(crate) file: FileGen,
    name: Ident,
    params: Vec<Param>,
    locals: IdentAllocator,
    stmts: Vec<Stmt>,
    mkctx: Option<Ident>,
}

impl FuncGen {
    pub(crate) fn new(options: &CodegenOptions) -> Result<Self, CodegenError> {
        let mut file = FileGen::new();
        let mut locals = IdentAllocator::new();
        let mut params = Vec::with_capacity(options.params.len());
        for (name, key) in &options.params {
            let ty = types::rewrite_type(&mut file, key.name())?;
            params.push(Param {
                ident: locals.create(name),
                key: *key,
                ty,
            });
        }
        Ok(Self {
            file,
            name: Ident::new(&options.function_name, proc_macro2::Span::call_site()),
            params,
            locals,
            stmts: Vec::new(),
            mkctx: None,
        })
    }

    /// The parameter identifier a supplied value of this type is bound to.
    pub(crate) fn prebound(&self, key: TypeKey) -> Option<Ident> {
        self.params
            .iter()
            .find(|param| param.key == key)
            .map(|param| param.ident.clone())
    }

    pub(crate) fn create_local(&mut self, prefix: &str) -> Ident {
        self.locals.create_avoiding(prefix, Some(self.file.idents()))
    }

    pub(crate) fn push_stmt(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    /// `ctx.for_name("..")`, declaring the module-key context on first use.
    pub(crate) fn module_key_expr(&mut self, name: &str) -> Result<Expr, CodegenError> {
        if self.mkctx.is_none() {
            let ident = self.create_local("module_key_context");
            self.stmts
                .push(parse_quote!(let #ident = solder::ModuleKeyContext::new();));
            self.mkctx = Some(ident);
        }
        let ident = self
            .mkctx
            .clone()
            .unwrap_or_else(|| unreachable!("the context identifier was just created"));
        Ok(parse_quote!(#ident.for_name(#name)))
    }

    pub(crate) fn own_module_key_expr(&mut self, name: &str) -> Result<Expr, CodegenError> {
        let inner = self.module_key_expr(name)?;
        Ok(parse_quote!(solder::OwnModuleKey::new(#inner)))
    }

    fn finish(
        mut self,
        outputs: Vec<(Type, Expr)>,
        patch_source: Option<&str>,
    ) -> Result<String, CodegenError> {
        let (types, exprs): (Vec<Type>, Vec<Expr>) = outputs.into_iter().unzip();
        let ret_ty: Type = match types.as_slice() {
            [single] => single.clone(),
            _ => parse_quote!((#(#types),*)),
        };
        let ret_expr: Expr = match exprs.as_slice() {
            [single] => single.clone(),
            _ => parse_quote!((#(#exprs),*)),
        };

        let name = &self.name;
        let param_idents: Vec<&Ident> = self.params.iter().map(|param| &param.ident).collect();
        let param_types: Vec<&Type> = self.params.iter().map(|param| &param.ty).collect();
        let stmts = std::mem::take(&mut self.stmts);
        let item: syn::ItemFn = parse_quote! {
            pub fn #name(
                #(#param_idents: #param_types),*
            ) -> Result<#ret_ty, Box<dyn std::error::Error + Send + Sync>> {
                #(#stmts)*
                Ok(#ret_expr)
            }
        };

        let uses = self.file.use_items();
        match patch_source {
            Some(source) => patch::apply(source, &self.name.to_string(), &item.block, &uses),
            None => {
                let mut items: Vec<syn::Item> = uses.into_iter().map(syn::Item::Use).collect();
                items.push(syn::Item::Fn(item));
                let file = syn::File {
                    shebang: None,
                    attrs: Vec::new(),
                    items,
                };
                Ok(prettyplease::unparse(&file))
            }
        }
    }
}

/// Runs the build with code emission enabled: providers are invoked, the
/// outputs are written through `targets`, and the equivalent straight-line
/// source is returned.
#[track_caller]
pub fn generate<T>(options: CodegenOptions, config: Config, targets: T) -> Result<String, Error>
where
    T: OutputTargets,
{
    let location = Location::call_site("solder::codegen::generate");
    let mkctx = ModuleKeyContext::new();
    let registry = Registry::register(config, &mkctx, true)?;
    let func = FuncGen::new(&options)?;
    let mut solver = Solver::new(registry, Some(func), None);

    let specs = T::specs();
    let slots = solver.build(&specs, &location)?;

    let Some(mut func) = solver.codegen.take() else {
        unreachable!("codegen state should survive the build")
    };
    let expr_slots: Vec<Option<Expr>> = slots
        .iter()
        .map(|slot| slot.as_ref().and_then(|slot| slot.expr.clone()))
        .collect();
    let mut outputs = Vec::new();
    let mut cursor = 0usize;
    for binding in T::outputs() {
        let slice = &expr_slots[cursor..cursor + binding.len];
        cursor += binding.len;
        let expr = (binding.build_expr)(slice, &mut func.file)?;
        let ty = func.file.type_expr(binding.key)?;
        outputs.push((ty, expr));
    }
    let source = func.finish(outputs, options.patch_source.as_deref())?;

    targets.fill(slots.into_iter().map(|slot| slot.map(|slot| slot.value)).collect());
    Ok(source)
}

/// Like [`generate`], writing the source to the supplied sink.
#[track_caller]
pub fn generate_into<W, T>(
    mut sink: W,
    options: CodegenOptions,
    config: Config,
    targets: T,
) -> Result<(), Error>
where
    W: Write,
    T: OutputTargets,
{
    let source = generate(options, config, targets)?;
    sink.write_all(source.as_bytes())
        .context(SinkSnafu)
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funcgen_prebinds_declared_params() {
        let options = CodegenOptions::new("build").param::<i32>("seed");
        let func = FuncGen::new(&options).unwrap();

        assert!(func.prebound(TypeKey::of::<i32>()).is_some());
        assert!(func.prebound(TypeKey::of::<u32>()).is_none());
    }

    #[test]
    fn funcgen_locals_avoid_param_names() {
        let options = CodegenOptions::new("build").param::<i32>("db");
        let mut func = FuncGen::new(&options).unwrap();

        assert_eq!(func.create_local("db").to_string(), "db2");
    }

    #[test]
    fn funcgen_declares_the_module_key_context_once() {
        let options = CodegenOptions::new("build");
        let mut func = FuncGen::new(&options).unwrap();

        let _ = func.module_key_expr("a").unwrap();
        let _ = func.module_key_expr("b").unwrap();
        assert_eq!(func.stmts.len(), 1);
    }
}
