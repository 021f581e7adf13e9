use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use crate::diag::RuntimeErrorKind;
use crate::interner::Symbol;
use crate::value::Value;

/// A lexical scope: mutable name→value bindings plus an immutable link to
/// the enclosing scope.
///
/// Environments are reference-counted because closures keep their defining
/// scope alive long after control has left it.  A function stored in a
/// binding of its own closure forms an `Rc` cycle; that leak is accepted.
#[derive(Debug)]
pub struct Env {
    parent: Option<Rc<Env>>,
    bindings: RefCell<HashMap<Symbol, Value>>,
}

impl Env {
    pub fn new() -> Rc<Env> {
        Self::with_parent(None)
    }

    pub fn with_parent(parent: Option<Rc<Env>>) -> Rc<Env> {
        Rc::new(Env {
            parent,
            bindings: RefCell::new(HashMap::new()),
        })
    }

    /// Creates a binding in this environment.  Names are unique per scope.
    pub fn define(&self, name: &Symbol, value: Value) -> Result<(), RuntimeErrorKind> {
        match self.bindings.borrow_mut().entry(name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
            Entry::Occupied(_) => Err(RuntimeErrorKind::RedeclaredVariable {
                name: name.to_string(),
            }),
        }
    }

    /// Rebinds an existing name, searching up the parent chain.
    pub fn assign(&self, name: &Symbol, value: Value) -> Result<(), RuntimeErrorKind> {
        match self.bindings.borrow_mut().entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                Ok(())
            }
            Entry::Vacant(_) => match &self.parent {
                Some(parent) => parent.assign(name, value),
                None => Err(RuntimeErrorKind::UndefinedVariable {
                    name: name.to_string(),
                }),
            },
        }
    }

    /// Reads a name, searching up the parent chain.
    pub fn get(&self, name: &Symbol) -> Option<Value> {
        match self.bindings.borrow().get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    /// The environment exactly `distance` parent links up.  The resolver
    /// guarantees the chain is long enough.
    pub fn ancestor(self: &Rc<Self>, distance: usize) -> Rc<Env> {
        let mut env = self.clone();
        for _ in 0..distance {
            let parent = env
                .parent
                .clone()
                .expect("resolved scope distance exceeds environment chain");
            env = parent;
        }
        env
    }

    /// Reads from the environment `distance` links up, without any fallback
    /// search.
    pub fn get_at(self: &Rc<Self>, distance: usize, name: &Symbol) -> Option<Value> {
        self.ancestor(distance).bindings.borrow().get(name).cloned()
    }

    /// Rebinds in the environment `distance` links up.
    pub fn assign_at(
        self: &Rc<Self>,
        distance: usize,
        name: &Symbol,
        value: Value,
    ) -> Result<(), RuntimeErrorKind> {
        match self
            .ancestor(distance)
            .bindings
            .borrow_mut()
            .entry(name.clone())
        {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                Ok(())
            }
            Entry::Vacant(_) => Err(RuntimeErrorKind::UndefinedVariable {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::Context;

    #[test]
    fn define_then_get() {
        let ctx = Context::new();
        let env = Env::new();
        let foo = ctx.symbol("foo");
        env.define(&foo, Value::Number(42.0)).unwrap();
        assert_eq!(env.get(&foo), Some(Value::Number(42.0)));
    }

    #[test]
    fn get_walks_the_parent_chain() {
        let ctx = Context::new();
        let parent = Env::new();
        let foo = ctx.symbol("foo");
        parent.define(&foo, Value::Number(1.0)).unwrap();
        let child = Env::with_parent(Some(parent));
        assert_eq!(child.get(&foo), Some(Value::Number(1.0)));
        assert_eq!(child.get(&ctx.symbol("bar")), None);
    }

    #[test]
    fn redefinition_in_one_scope_is_an_error() {
        let ctx = Context::new();
        let env = Env::new();
        let foo = ctx.symbol("foo");
        env.define(&foo, Value::Number(1.0)).unwrap();
        match env.define(&foo, Value::Number(2.0)) {
            Err(RuntimeErrorKind::RedeclaredVariable { name }) if name == "foo" => (),
            out => panic!("unexpected output: {:?}", out),
        }
    }

    #[test]
    fn shadowing_in_a_child_scope_is_fine() {
        let ctx = Context::new();
        let parent = Env::new();
        let foo = ctx.symbol("foo");
        parent.define(&foo, Value::Number(1.0)).unwrap();
        let child = Env::with_parent(Some(parent.clone()));
        child.define(&foo, Value::Number(2.0)).unwrap();
        assert_eq!(child.get(&foo), Some(Value::Number(2.0)));
        assert_eq!(parent.get(&foo), Some(Value::Number(1.0)));
    }

    #[test]
    fn assign_updates_the_defining_scope() {
        let ctx = Context::new();
        let parent = Env::new();
        let foo = ctx.symbol("foo");
        parent.define(&foo, Value::Number(1.0)).unwrap();
        let child = Env::with_parent(Some(parent.clone()));
        child.assign(&foo, Value::Number(5.0)).unwrap();
        assert_eq!(parent.get(&foo), Some(Value::Number(5.0)));
    }

    #[test]
    fn assign_to_unknown_name_is_an_error() {
        let ctx = Context::new();
        let env = Env::new();
        match env.assign(&ctx.symbol("foo"), Value::Nil) {
            Err(RuntimeErrorKind::UndefinedVariable { name }) if name == "foo" => (),
            out => panic!("unexpected output: {:?}", out),
        }
    }

    #[test]
    fn get_at_skips_exactly_distance_links() {
        let ctx = Context::new();
        let foo = ctx.symbol("foo");
        let grandparent = Env::new();
        grandparent.define(&foo, Value::Number(1.0)).unwrap();
        let parent = Env::with_parent(Some(grandparent));
        parent.define(&foo, Value::Number(2.0)).unwrap();
        let child = Env::with_parent(Some(parent));
        assert_eq!(child.get_at(1, &foo), Some(Value::Number(2.0)));
        assert_eq!(child.get_at(2, &foo), Some(Value::Number(1.0)));
        // No fallback search from the target environment.
        assert_eq!(child.get_at(0, &foo), None);
    }

    #[test]
    fn assign_at_targets_one_environment() {
        let ctx = Context::new();
        let foo = ctx.symbol("foo");
        let parent = Env::new();
        parent.define(&foo, Value::Number(1.0)).unwrap();
        let child = Env::with_parent(Some(parent.clone()));
        child.define(&foo, Value::Number(2.0)).unwrap();
        child.assign_at(1, &foo, Value::Number(9.0)).unwrap();
        assert_eq!(parent.get(&foo), Some(Value::Number(9.0)));
        assert_eq!(child.get_at(0, &foo), Some(Value::Number(2.0)));
    }

    #[test]
    fn uninit_is_storable_and_retrievable() {
        let ctx = Context::new();
        let env = Env::new();
        let foo = ctx.symbol("foo");
        env.define(&foo, Value::Uninit).unwrap();
        assert_eq!(env.get(&foo), Some(Value::Uninit));
    }
}
