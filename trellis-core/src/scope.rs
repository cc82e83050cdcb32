use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::value::Value;

/// The outermost surface an expression can see (a component's props, state
/// and methods).
pub trait Namespace {
    fn lookup(&self, name: &str) -> Option<Value>;
    fn assign(&self, name: &str, value: Value);
}

/// Namespace with nothing in it. Writes are dropped.
pub struct EmptyNamespace;

impl Namespace for EmptyNamespace {
    fn lookup(&self, _name: &str) -> Option<Value> {
        None
    }

    fn assign(&self, _name: &str, _value: Value) {}
}

/// Called with the new value when a linked name is assigned.
pub type WriteBack = Rc<dyn Fn(&Value) -> Result<(), String>>;

struct Frame {
    vars: RefCell<BTreeMap<String, Value>>,
    parent: Option<Scope>,
    root: Rc<dyn Namespace>,
    link: Option<(String, WriteBack)>,
}

/// A chain of named-value frames ending in a [`Namespace`].
///
/// Cloning a scope shares the frame, so updating a loop row's frame in place
/// is seen by every binding of that row.
#[derive(Clone)]
pub struct Scope {
    frame: Rc<Frame>,
}

impl Scope {
    pub fn new(root: Rc<dyn Namespace>) -> Self {
        Self {
            frame: Rc::new(Frame {
                vars: RefCell::new(BTreeMap::new()),
                parent: None,
                root,
                link: None,
            }),
        }
    }

    pub fn detached() -> Self {
        Self::new(Rc::new(EmptyNamespace))
    }

    /// Push a child frame binding `name` to `value`.
    pub fn with_binding(&self, name: impl Into<String>, value: Value) -> Scope {
        self.push(name.into(), value, None)
    }

    /// Like [`Scope::with_binding`], but every assignment to `name` through
    /// the new frame is also passed to `write_back`.
    pub fn with_linked_binding(
        &self,
        name: impl Into<String>,
        value: Value,
        write_back: impl Fn(&Value) -> Result<(), String> + 'static,
    ) -> Scope {
        let name = name.into();
        let link: WriteBack = Rc::new(write_back);
        self.push(name.clone(), value, Some((name, link)))
    }

    fn push(&self, name: String, value: Value, link: Option<(String, WriteBack)>) -> Scope {
        let mut vars = BTreeMap::new();
        vars.insert(name, value);
        Scope {
            frame: Rc::new(Frame {
                vars: RefCell::new(vars),
                parent: Some(self.clone()),
                root: Rc::clone(&self.frame.root),
                link,
            }),
        }
    }

    /// Whether `name` is bound in this frame itself.
    pub fn defines_here(&self, name: &str) -> bool {
        self.frame.vars.borrow().contains_key(name)
    }

    /// Set `name` in this frame only.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.vars.borrow_mut().insert(name.into(), value);
    }

    /// Walk outward until found; unresolved names read as null.
    pub fn lookup(&self, name: &str) -> Value {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(v) = scope.frame.vars.borrow().get(name) {
                return v.clone();
            }
            current = scope.frame.parent.as_ref();
        }
        self.frame.root.lookup(name).unwrap_or_default()
    }

    /// Write to the nearest frame defining `name`, otherwise to the root.
    /// A linked frame also forwards the value to its write-back.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), String> {
        let mut current = Some(self);
        while let Some(scope) = current {
            let mut vars = scope.frame.vars.borrow_mut();
            if let Some(slot) = vars.get_mut(name) {
                *slot = value.clone();
                drop(vars);
                return match &scope.frame.link {
                    Some((linked, write_back)) if linked == name => write_back(&value),
                    _ => Ok(()),
                };
            }
            drop(vars);
            current = scope.frame.parent.as_ref();
        }
        self.frame.root.assign(name, value);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.frame.parent.as_ref();
        while let Some(scope) = current {
            depth += 1;
            current = scope.frame.parent.as_ref();
        }
        depth
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("vars", &self.frame.vars.borrow().keys().collect::<Vec<_>>())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward_and_defaults_to_null() {
        let root = Scope::detached();
        root.define("a", Value::from(1));
        let child = root.with_binding("item", Value::from("x"));
        assert_eq!(child.lookup("a"), Value::from(1));
        assert_eq!(child.lookup("item"), Value::from("x"));
        assert_eq!(child.lookup("missing"), Value::Null);
        assert_eq!(root.lookup("item"), Value::Null);
    }

    #[test]
    fn assign_targets_defining_frame() {
        let root = Scope::detached();
        root.define("count", Value::from(1));
        let child = root.with_binding("item", Value::Null);
        child.assign("count", Value::from(2)).unwrap();
        child.assign("item", Value::from(3)).unwrap();
        assert_eq!(root.lookup("count"), Value::from(2));
        assert_eq!(child.lookup("item"), Value::from(3));
        assert!(child.defines_here("item"));
        assert!(!child.defines_here("count"));
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn linked_frames_forward_assignments() {
        let root = Scope::detached();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let row = root.with_linked_binding("item", Value::from(1), move |v| {
            sink.borrow_mut().push(v.clone());
            Ok(())
        });
        row.assign("item", Value::from(2)).unwrap();
        row.define("item", Value::from(3));
        assert_eq!(row.lookup("item"), Value::from(3));
        assert_eq!(*seen.borrow(), [Value::from(2)], "define does not write back");

        let failing = root.with_linked_binding("item", Value::Null, |_| Err("nope".into()));
        assert_eq!(failing.assign("item", Value::from(1)), Err("nope".to_string()));
        assert_eq!(failing.lookup("item"), Value::from(1));
    }
}
