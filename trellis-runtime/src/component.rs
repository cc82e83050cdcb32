use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use trellis_core::{Callable, Namespace, State, Value};

use crate::error::AggregateError;

pub type ErrorHandler = Rc<dyn Fn(&AggregateError)>;

/// Builds the state surface of a child component instance.
pub type ComponentFactory = Rc<dyn Fn() -> State>;

/// The surface root-level expressions see: methods, then props, then state.
#[derive(Default)]
pub struct Component {
    pub(crate) state: State,
    props: RefCell<BTreeMap<String, Value>>,
    methods: RefCell<BTreeMap<String, Callable>>,
    error_handler: RefCell<Option<ErrorHandler>>,
}

impl Component {
    pub fn new(state: State) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns whether the prop changed.
    pub fn set_prop(&self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        let mut props = self.props.borrow_mut();
        if props.get(&name) == Some(&value) {
            return false;
        }
        props.insert(name, value);
        true
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.props.borrow().get(name).cloned()
    }

    pub fn define_method(&self, method: Callable) {
        self.methods
            .borrow_mut()
            .insert(method.name().to_string(), method);
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.borrow_mut() = Some(handler);
    }

    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.error_handler.borrow().clone()
    }
}

impl Namespace for Component {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(method) = self.methods.borrow().get(name) {
            return Some(Value::Function(method.clone()));
        }
        if let Some(prop) = self.props.borrow().get(name) {
            return Some(prop.clone());
        }
        Some(self.state.get(name))
    }

    /// Props are read-only from templates; every write lands in state.
    fn assign(&self, name: &str, value: Value) {
        self.state.set(name, value);
    }
}
