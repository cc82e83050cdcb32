use std::rc::Rc;

use super::{Binding, Directive, Flow};
use crate::error::{BindingError, ConfigError};
use crate::pass::Pass;
use crate::registry::BindingId;
use crate::runtime::Engine;

/// `data-state:<name>`: pushes a parent value into a child component's state.
#[derive(Debug)]
pub struct StateBinding {
    pub name: String,
}

impl StateBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Directive for StateBinding {
    fn bind(&self, binding: &Rc<Binding>, _id: BindingId, engine: &Rc<Engine>) -> Result<(), ConfigError> {
        engine.ensure_child(binding.node)
    }

    fn execute(&self, binding: &Rc<Binding>, engine: &Rc<Engine>, _pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        let value = binding.evaluate()?;
        if binding.changed(&value) {
            if let Some(child) = engine.child_state(binding.node) {
                child.set(self.name.as_str(), value.clone());
            }
            binding.remember(value);
        }
        Ok(Flow::Continue)
    }
}
