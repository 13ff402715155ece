//! The label/symbol store (§4.10). Out of scope per §1 except as an interface: [`LabelStore`]
//! names every operation the core consumes; [`SymbolTable`] is a minimal in-memory
//! implementation (grounded on the teacher's `vasm::labels::LabelMap`, a plain `HashMap`) that is
//! enough to drive a single-pass assembly of one file, not a production multi-pass backend.

use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LabelKind {
    Local,
    Global,
    Static,
    Extern,
    Common,
    Special,
    Backend,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MangleKind {
    GlobalPrefix,
    GlobalSuffix,
    LocalPrefix,
    LocalSuffix,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Location {
    pub segment: u16,
    pub offset: i64,
}

/// Every operation the assembler core consumes from the label/symbol store (§4.10). A real
/// backend's store lives across passes and outside this crate entirely; this trait is the
/// contract, not an implementation.
pub trait LabelStore {
    fn lookup(&self, name: &str) -> Option<Location>;
    fn is_extern(&self, name: &str) -> bool;
    fn declare(&mut self, name: &str, kind: LabelKind);
    fn define(&mut self, name: &str, location: Location, normal: bool);
    /// The scope prefix a dotted local label (`.loop`) expands against, keyed on the most
    /// recently defined non-local label.
    fn local_scope(&self) -> Option<&str>;
    fn set_mangle(&mut self, kind: MangleKind, text: &str);
}

/// Minimal in-memory [`LabelStore`] sufficient to assemble a single file in one forward pass,
/// grounded on the teacher's `vasm::labels::LabelMap` (`HashMap<&str, u32>`).
#[derive(Default)]
pub struct SymbolTable {
    symbols: HashMap<String, (Location, LabelKind)>,
    externs: HashMap<String, ()>,
    scope: Option<String>,
    mangles: HashMap<MangleKind, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Resolve a dotted local label (`.loop`) against the current scope, mirroring the parser's
    /// dotted-identifier handling (§4.4).
    pub fn resolve_name(&self, name: &str) -> String {
        if name.starts_with('.') {
            match &self.scope {
                Some(scope) => format!("{}{}", scope, name),
                None => name.to_string(),
            }
        } else {
            name.to_string()
        }
    }

    pub fn enter_scope(&mut self, label: &str) {
        if !label.starts_with('.') {
            self.scope = Some(label.to_string());
        }
    }
}

impl LabelStore for SymbolTable {
    fn lookup(&self, name: &str) -> Option<Location> {
        let resolved = self.resolve_name(name);
        self.symbols.get(&resolved).map(|(loc, _)| *loc)
    }

    fn is_extern(&self, name: &str) -> bool {
        self.externs.contains_key(name)
    }

    fn declare(&mut self, name: &str, kind: LabelKind) {
        if kind == LabelKind::Extern {
            self.externs.insert(name.to_string(), ());
        }
    }

    /// Resolves `name` against the current local-label scope before storing it, then (for a
    /// non-dotted name) makes it the new scope every later `.local` label resolves against
    /// (§4.4/§4.10).
    fn define(&mut self, name: &str, location: Location, _normal: bool) {
        let resolved = self.resolve_name(name);
        let kind = self.symbols.get(&resolved).map(|(_, k)| *k).unwrap_or(LabelKind::Local);
        self.symbols.insert(resolved, (location, kind));
        self.enter_scope(name);
    }

    fn local_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn set_mangle(&mut self, kind: MangleKind, text: &str) {
        self.mangles.insert(kind, text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_label_resolves_against_last_scope() {
        let mut t = SymbolTable::new();
        t.enter_scope("outer");
        assert_eq!(t.resolve_name(".loop"), "outer.loop");
    }

    #[test]
    fn define_then_lookup_roundtrips() {
        let mut t = SymbolTable::new();
        let loc = Location { segment: 0, offset: 0x10 };
        t.define("foo", loc, true);
        assert_eq!(t.lookup("foo"), Some(loc));
        assert_eq!(t.lookup("bar"), None);
    }
}
