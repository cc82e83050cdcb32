use std::rc::Rc;

use trellis_core::Value;

use super::{Binding, Directive, Flow};
use crate::error::BindingError;
use crate::pass::Pass;
use crate::runtime::Engine;

/// Where a `data-bind:<prop>` result lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTarget {
    Text,
    /// Live element state that has no attribute mirror (`value`, `checked`).
    Property(String),
    Style(String),
    Attribute(String),
}

impl DataTarget {
    pub fn parse(prop: &str) -> Self {
        match prop {
            "text" => DataTarget::Text,
            "value" | "checked" | "selected" | "indeterminate" => {
                DataTarget::Property(prop.to_string())
            }
            _ => match prop.strip_prefix("style.") {
                Some(style) if !style.is_empty() => DataTarget::Style(style.to_string()),
                _ => DataTarget::Attribute(prop.to_string()),
            },
        }
    }
}

#[derive(Debug)]
pub struct DataBinding {
    pub target: DataTarget,
}

impl DataBinding {
    pub fn new(prop: &str) -> Self {
        Self {
            target: DataTarget::parse(prop),
        }
    }
}

impl Directive for DataBinding {
    fn execute(&self, binding: &Rc<Binding>, engine: &Rc<Engine>, _pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        let value = binding.evaluate()?;
        if !binding.changed(&value) {
            return Ok(Flow::Continue);
        }
        let node = binding.node;
        {
            let mut doc = engine.doc.borrow_mut();
            match &self.target {
                DataTarget::Text => doc.set_text_content(node, &value.to_display_string())?,
                DataTarget::Property(name) => doc.set_property(node, name, value.clone())?,
                DataTarget::Style(prop) => match value {
                    Value::Null | Value::Bool(false) => doc.remove_style(node, prop)?,
                    ref v => doc.set_style(node, prop, v.to_display_string())?,
                },
                DataTarget::Attribute(name) => match value {
                    Value::Bool(true) => doc.set_attr(node, name, "")?,
                    Value::Null | Value::Bool(false) => {
                        doc.remove_attr(node, name)?;
                    }
                    ref v => doc.set_attr(node, name, v.to_display_string())?,
                },
            }
        }
        binding.remember(value);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_classified_by_prop_name() {
        assert_eq!(DataTarget::parse("text"), DataTarget::Text);
        assert_eq!(DataTarget::parse("checked"), DataTarget::Property("checked".into()));
        assert_eq!(DataTarget::parse("style.color"), DataTarget::Style("color".into()));
        assert_eq!(DataTarget::parse("style."), DataTarget::Attribute("style.".into()));
        assert_eq!(DataTarget::parse("href"), DataTarget::Attribute("href".into()));
    }
}
