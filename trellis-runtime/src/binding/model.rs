use std::rc::Rc;

use trellis_core::Value;
use trellis_template::Evaluator;

use super::{Binding, Directive, Flow, Site};
use crate::error::{BindingError, ConfigError};
use crate::pass::Pass;
use crate::runtime::Engine;

/// Two-way `data-model`: state flows into the element's live property, user
/// input flows back through a compiled `path = $value` writer.
pub struct ModelBinding {
    writer: Evaluator,
    /// `checked` for checkboxes and radios, `value` otherwise.
    pub property: &'static str,
}

impl ModelBinding {
    pub(crate) fn parse(site: &Site<'_>, path: &str, input_type: Option<&str>) -> Result<(Self, Evaluator), ConfigError> {
        let reader = site.compile(path, &[])?;
        let writer = site.compile_assignable(&format!("{path} = $value"), &["$value"])?;
        let property = match input_type {
            Some("checkbox") | Some("radio") => "checked",
            _ => "value",
        };
        Ok((Self { writer, property }, reader))
    }

    /// Push user input into state. Once state accepts it the value is
    /// remembered, so the next pass does not write it back to the element.
    /// A rejected write is forgotten and the next pass restores the element.
    pub(crate) fn write(&self, binding: &Binding, engine: &Engine, value: Value) -> Result<(), BindingError> {
        engine
            .doc
            .borrow_mut()
            .set_property(binding.node, self.property, value.clone())?;
        match self.writer.evaluate(&binding.scope, &[value.clone()]) {
            Ok(_) => {
                binding.remember(value);
                Ok(())
            }
            Err(source) => {
                binding.forget();
                Err(binding.eval_error(source))
            }
        }
    }
}

impl Directive for ModelBinding {
    fn execute(&self, binding: &Rc<Binding>, engine: &Rc<Engine>, _pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        let value = binding.evaluate()?;
        if binding.changed(&value) {
            engine
                .doc
                .borrow_mut()
                .set_property(binding.node, self.property, value.clone())?;
            binding.remember(value);
        }
        Ok(Flow::Continue)
    }
}
