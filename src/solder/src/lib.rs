#![allow(clippy::new_without_default)]

pub mod codegen;
pub mod config;
pub mod container;
pub mod debug;
pub mod key;
pub mod provider;

mod error;
mod util;

pub use crate::container::{inject, inject_with_debug};
pub use crate::error::Error;
pub use crate::key::{ModuleKey, ModuleKeyContext, OwnModuleKey};
pub use solder_derive::{In, Out, Providable};

/// Declares that an interface, consumed as `Arc<dyn Trait>`, participates
/// in resolution. The trait must have `Send + Sync + 'static` supertraits.
#[macro_export]
macro_rules! declare_interface {
    (dyn $iface:path) => {
        impl $crate::provider::Providable for ::std::sync::Arc<dyn $iface> {
            fn input_shape() -> $crate::provider::InputShape {
                $crate::provider::InputShape::interface(
                    <Self as $crate::provider::Providable>::key(),
                )
            }
        }
    };
}

/// Declares a foreign or shared type providable with the default shapes,
/// for types `#[derive(Providable)]` cannot reach.
#[macro_export]
macro_rules! providable {
    ($ty:ty) => {
        impl $crate::provider::Providable for $ty {}
    };
    (shared $ty:ty) => {
        impl $crate::provider::Providable for ::std::sync::Arc<$ty> {}
    };
}

pub mod prelude {
    pub use crate::config::{
        bind_interface, bind_interface_in_module, configs, error, invoke, invoke_in_module,
        provide, provide_in_module, supply, Config,
    };
    pub use crate::container::{inject, inject_with_debug};
    pub use crate::debug::DebugOptions;
    pub use crate::key::{ModuleKey, ModuleKeyContext, OwnModuleKey};
    pub use crate::provider::{ManyPerContainer, OnePerModule, Providable};
    pub use crate::{declare_interface, providable};
    pub use crate::{In, Out, Providable};
}
