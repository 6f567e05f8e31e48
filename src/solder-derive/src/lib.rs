mod attrs;
mod impls;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Makes a type resolvable and providable by the container.
///
/// Attributes under `#[providable(..)]`:
/// - `many_per_container` — providers may output any number; consumed as a
///   `Vec` of the type.
/// - `one_per_module` — one per module; consumed as a `BTreeMap` keyed by
///   module name.
/// - `shared` — additionally implements the trait for `Arc<Self>`.
/// - `implements(dyn Trait, ..)` — records interface casts consulted by
///   interface binding.
/// - `expressible` — renders supplied values field by field in generated
///   code; every field must be providable.
#[proc_macro_derive(Providable, attributes(providable))]
pub fn derive_providable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impls::expand_providable(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

/// Expands a struct argument into one container input per field.
/// `#[solder(optional)]` fields fall back to their default when absent.
#[proc_macro_derive(In, attributes(solder))]
pub fn derive_in(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impls::expand_in(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

/// Expands a struct return value into one container output per field.
#[proc_macro_derive(Out, attributes(solder))]
pub fn derive_out(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impls::expand_out(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}
