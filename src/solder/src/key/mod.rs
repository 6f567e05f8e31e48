mod module_key;
mod type_key;

pub use module_key::{ModuleKey, ModuleKeyContext, OwnModuleKey};
pub use type_key::TypeKey;
