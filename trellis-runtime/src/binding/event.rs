use std::rc::Rc;

use trellis_core::Value;

use super::{Binding, Directive, Flow};
use crate::error::{BindingError, ConfigError};
use crate::pass::Pass;
use crate::registry::BindingId;
use crate::runtime::Engine;

/// `on<event>` handler. Installed once at bind time and never part of a pass.
#[derive(Debug)]
pub struct EventBinding {
    pub event: String,
}

impl EventBinding {
    pub fn new(event: impl Into<String>) -> Self {
        Self { event: event.into() }
    }

    /// Run the handler with `payload` bound to `$event`.
    pub(crate) fn fire(&self, binding: &Binding, payload: Value) -> Result<Value, BindingError> {
        binding
            .evaluator
            .invoke(&binding.scope, payload)
            .map_err(|source| binding.eval_error(source))
    }
}

impl Directive for EventBinding {
    fn bind(&self, binding: &Rc<Binding>, id: BindingId, engine: &Rc<Engine>) -> Result<(), ConfigError> {
        engine.events.borrow_mut().on(binding.node, &self.event, id);
        Ok(())
    }

    fn execute(&self, _binding: &Rc<Binding>, _engine: &Rc<Engine>, _pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        Ok(Flow::Continue)
    }
}
