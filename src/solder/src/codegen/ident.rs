use std::collections::HashSet;

use proc_macro2::Span;
use syn::Ident;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Allocates identifiers within one scope: the first free candidate among
/// `prefix`, `prefix2`, `prefix3`, … Keywords are reserved from the start.
pub(crate) struct IdentAllocator {
    taken: HashSet<String>,
}

impl IdentAllocator {
    pub(crate) fn new() -> Self {
        Self {
            taken: KEYWORDS.iter().map(|kw| (*kw).to_owned()).collect(),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub(crate) fn create(&mut self, prefix: &str) -> Ident {
        self.create_avoiding(prefix, None)
    }

    /// Allocates in this scope while also avoiding names taken in an outer
    /// scope (locals must not shadow file-level aliases).
    pub(crate) fn create_avoiding(&mut self, prefix: &str, outer: Option<&IdentAllocator>) -> Ident {
        let prefix = ident_prefix(prefix);
        let mut n = 1usize;
        loop {
            let candidate = if n == 1 {
                prefix.clone()
            } else {
                format!("{prefix}{n}")
            };
            let shadowed = outer.is_some_and(|outer| outer.contains(&candidate));
            if !self.taken.contains(&candidate) && !shadowed {
                self.taken.insert(candidate.clone());
                return Ident::new(&candidate, Span::call_site());
            }
            n += 1;
        }
    }
}

/// Reduces an arbitrary type or function name to a usable identifier seed:
/// the head before any generic arguments, lowercased, stripped to
/// identifier characters.
pub(crate) fn ident_prefix(name: &str) -> String {
    let head = name.split('<').next().unwrap_or(name);
    let cleaned: String = head
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let cleaned = cleaned.to_ascii_lowercase();
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        cleaned
    } else {
        String::from("v")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_suffixes_on_collision() {
        let mut idents = IdentAllocator::new();
        assert_eq!(idents.create("db").to_string(), "db");
        assert_eq!(idents.create("db").to_string(), "db2");
        assert_eq!(idents.create("db").to_string(), "db3");
    }

    #[test]
    fn allocator_avoids_keywords() {
        let mut idents = IdentAllocator::new();
        assert_eq!(idents.create("fn").to_string(), "fn2");
    }

    #[test]
    fn allocator_avoids_outer_scope() {
        let mut outer = IdentAllocator::new();
        outer.create("config");
        let mut inner = IdentAllocator::new();
        assert_eq!(
            inner.create_avoiding("config", Some(&outer)).to_string(),
            "config2"
        );
    }

    #[test]
    fn ident_prefix_sanitizes_type_names() {
        assert_eq!(ident_prefix("Vec<app::ManyInt>"), "vec");
        assert_eq!(ident_prefix("Db"), "db");
        assert_eq!(ident_prefix("&str"), "str");
        assert_eq!(ident_prefix("123"), "v");
    }
}
