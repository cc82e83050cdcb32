use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::Value;

use super::{Binding, Directive, Flow};
use crate::error::{BindingError, ConfigError};
use crate::pass::Pass;
use crate::registry::BindingId;
use crate::runtime::Engine;

/// `data-if` and `data-else`. Hidden nodes get `display: none` plus `inert`.
#[derive(Debug, Default)]
pub struct ConditionBinding {
    /// Set for `data-else`, whose expression is the negated partner.
    pub negated: bool,
    natural_display: RefCell<Option<String>>,
    natural_inert: Cell<bool>,
}

impl ConditionBinding {
    pub fn new(negated: bool) -> Self {
        Self {
            negated,
            natural_display: RefCell::new(None),
            natural_inert: Cell::new(false),
        }
    }
}

impl Directive for ConditionBinding {
    fn bind(&self, binding: &Rc<Binding>, _id: BindingId, engine: &Rc<Engine>) -> Result<(), ConfigError> {
        let doc = engine.doc.borrow();
        *self.natural_display.borrow_mut() = doc.style(binding.node, "display").map(str::to_string);
        self.natural_inert.set(doc.has_attr(binding.node, "inert"));
        Ok(())
    }

    fn execute(&self, binding: &Rc<Binding>, engine: &Rc<Engine>, _pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        let visible = binding.evaluate()?.truthy();
        let value = Value::Bool(visible);
        if binding.changed(&value) {
            let node = binding.node;
            let mut doc = engine.doc.borrow_mut();
            if visible {
                match self.natural_display.borrow().as_deref() {
                    Some(display) => doc.set_style(node, "display", display)?,
                    None => doc.remove_style(node, "display")?,
                }
                if !self.natural_inert.get() {
                    doc.remove_attr(node, "inert")?;
                }
            } else {
                doc.set_style(node, "display", "none")?;
                doc.set_attr(node, "inert", "")?;
            }
            binding.remember(value);
        }
        Ok(if visible { Flow::Continue } else { Flow::Suspend })
    }
}
