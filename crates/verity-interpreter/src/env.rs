//! Lexical environments
//!
//! Environments form a parent-pointer tree, never a graph: closures hold a
//! shared immutable reference to their defining environment, and new call
//! frames only add children. Each tree is exclusively owned by one
//! evaluation call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// One scope frame: local bindings plus an optional parent.
#[derive(Debug, Default)]
pub struct Environment {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    /// A fresh root scope.
    pub fn root() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// A root scope pre-populated with initial bindings.
    pub fn with_bindings(bindings: impl IntoIterator<Item = (String, Value)>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(bindings.into_iter().collect()),
            parent: None,
        })
    }

    /// A child frame chained to `parent`.
    pub fn child(parent: &Rc<Environment>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Bind `name` in this frame, shadowing any outer binding.
    pub fn define(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Look `name` up through the frame chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Rebind `name` in the nearest frame that defines it. Returns false if
    /// no frame in the chain defines the name.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return true;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_chain() {
        let root = Environment::root();
        root.define("x", Value::Number(1.0));
        let child = Environment::child(&root);
        assert!(matches!(child.lookup("x"), Some(Value::Number(n)) if n == 1.0));
        assert!(child.lookup("y").is_none());
    }

    #[test]
    fn define_shadows_without_touching_parent() {
        let root = Environment::root();
        root.define("x", Value::Number(1.0));
        let child = Environment::child(&root);
        child.define("x", Value::Number(2.0));
        assert!(matches!(child.lookup("x"), Some(Value::Number(n)) if n == 2.0));
        assert!(matches!(root.lookup("x"), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn assign_rebinds_the_defining_frame() {
        let root = Environment::root();
        root.define("counter", Value::Number(0.0));
        let child = Environment::child(&root);
        assert!(child.assign("counter", Value::Number(5.0)));
        assert!(matches!(root.lookup("counter"), Some(Value::Number(n)) if n == 5.0));
    }

    #[test]
    fn assign_fails_for_undefined_names() {
        let root = Environment::root();
        assert!(!root.assign("ghost", Value::Null));
    }
}
