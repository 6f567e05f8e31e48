use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An interned handle identifying one logical module.
///
/// Module keys compare by identity: two keys are equal iff they were
/// produced by the same [`ModuleKeyContext`] for the same name. A key
/// obtained elsewhere never equals one interned here, even with an equal
/// name string.
#[derive(Clone)]
pub struct ModuleKey {
    cell: Arc<ModuleKeyCell>,
}

struct ModuleKeyCell {
    name: String,
}

impl ModuleKey {
    pub fn name(&self) -> &str {
        &self.cell.name
    }
}

impl PartialEq for ModuleKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ModuleKey {}

impl Hash for ModuleKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.cell) as usize).hash(state);
    }
}

impl Debug for ModuleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "ModuleKey({})", self.cell.name)
    }
}

impl Display for ModuleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.cell.name)
    }
}

/// The key of the module a provider itself was registered in, as opposed to
/// the module of whichever consumer triggered it.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct OwnModuleKey(ModuleKey);

impl OwnModuleKey {
    pub fn new(key: ModuleKey) -> Self {
        Self(key)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn key(&self) -> &ModuleKey {
        &self.0
    }
}

/// Interns module names into [`ModuleKey`]s for the duration of one build.
pub struct ModuleKeyContext {
    entries: RefCell<HashMap<String, ModuleKey>>,
}

impl ModuleKeyContext {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn for_name(&self, name: &str) -> ModuleKey {
        if let Some(key) = self.entries.borrow().get(name) {
            return key.clone();
        }
        let key = ModuleKey {
            cell: Arc::new(ModuleKeyCell {
                name: name.to_owned(),
            }),
        };
        self.entries
            .borrow_mut()
            .insert(name.to_owned(), key.clone());
        key
    }
}

impl Default for ModuleKeyContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_key_equality_succeeds_within_one_context() {
        let ctx = ModuleKeyContext::new();
        let a1 = ctx.for_name("a");
        let a2 = ctx.for_name("a");
        let b = ctx.for_name("b");

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.name(), "a");
    }

    #[test]
    fn module_key_equality_fails_across_contexts() {
        let ctx1 = ModuleKeyContext::new();
        let ctx2 = ModuleKeyContext::new();

        assert_ne!(ctx1.for_name("a"), ctx2.for_name("a"));
    }
}
