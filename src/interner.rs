//! String interner.
//!
//! Identifiers are interned once per session so that every later comparison
//! (environment lookups, keyword checks) is a pointer comparison.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Stores every symbol seen so far.
#[derive(Debug, Default)]
pub struct Interner(HashSet<Symbol>);

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Maps a string to its unique symbol, allocating on first sight.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(sym) = self.0.get(name) {
            sym.clone()
        } else {
            let sym = Symbol(Rc::from(name));
            self.0.insert(sym.clone());
            sym
        }
    }
}

/// An interned immutable string: two symbols with the same spelling share one
/// allocation, so equality is pointer equality.  Hashing still goes through
/// the content so maps can be probed with a plain `&str`.
#[derive(Debug, Hash, Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_keeps_its_spelling() {
        let mut interner = Interner::new();
        let sym = interner.intern("foo");
        assert_eq!(sym.as_str(), "foo");
    }

    #[test]
    fn same_spelling_interns_to_equal_symbols() {
        let mut interner = Interner::new();
        let sym1 = interner.intern("foo");
        let sym2 = interner.intern("foo");
        assert_eq!(sym1, sym2);
    }

    #[test]
    fn different_spellings_intern_to_different_symbols() {
        let mut interner = Interner::new();
        let sym1 = interner.intern("foo");
        let sym2 = interner.intern("bar");
        assert_ne!(sym1, sym2);
    }
}
