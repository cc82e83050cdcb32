//! The binding taxonomy: one [`Binding`] per (node, directive attribute).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trellis_core::{Scope, Value};
use trellis_dom::NodeId;
use trellis_template::{Evaluator, compile, compile_assignable};

use crate::error::{BindingError, ConfigError};
use crate::pass::Pass;
use crate::registry::BindingId;
use crate::runtime::Engine;

pub mod condition;
pub mod data;
pub mod event;
pub mod loops;
pub mod model;
pub mod state;

pub use condition::ConditionBinding;
pub use data::{DataBinding, DataTarget};
pub use event::EventBinding;
pub use loops::{Iteration, LoopBinding};
pub use model::ModelBinding;
pub use state::StateBinding;

/// Whether the rest of a node (and its subtree) runs this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Suspend,
}

/// Setup and per-pass behaviour shared by every binding kind.
pub(crate) trait Directive {
    /// One-time setup right after the binding is registered.
    fn bind(&self, _binding: &Rc<Binding>, _id: BindingId, _engine: &Rc<Engine>) -> Result<(), ConfigError> {
        Ok(())
    }

    fn execute(
        &self,
        binding: &Rc<Binding>,
        engine: &Rc<Engine>,
        pass: &Rc<Pass>,
    ) -> Result<Flow, BindingError>;
}

pub enum BindingKind {
    Condition(ConditionBinding),
    Data(DataBinding),
    Model(ModelBinding),
    Event(EventBinding),
    Loop(LoopBinding),
    State(StateBinding),
}

impl BindingKind {
    pub fn name(&self) -> &'static str {
        match self {
            BindingKind::Condition(_) => "condition",
            BindingKind::Data(_) => "data",
            BindingKind::Model(_) => "model",
            BindingKind::Event(_) => "event",
            BindingKind::Loop(_) => "loop",
            BindingKind::State(_) => "state",
        }
    }

    fn directive(&self) -> &dyn Directive {
        match self {
            BindingKind::Condition(d) => d,
            BindingKind::Data(d) => d,
            BindingKind::Model(d) => d,
            BindingKind::Event(d) => d,
            BindingKind::Loop(d) => d,
            BindingKind::State(d) => d,
        }
    }
}

pub struct Binding {
    pub kind: BindingKind,
    pub node: NodeId,
    pub attribute: String,
    pub expression: String,
    pub modifier: Option<String>,
    pub evaluator: Evaluator,
    pub scope: Scope,
    /// `attribute="expression" on <tag>`, used in logs and failure reports.
    pub label: String,
    /// Scope names the expression resolves.
    names: Vec<String>,
    last: RefCell<Option<Value>>,
    alive: Cell<bool>,
}

impl Binding {
    pub(crate) fn new(parts: BindingParts, node: NodeId, tag: &str, scope: Scope) -> Self {
        let label = format!("{}=\"{}\" on <{}>", parts.attribute, parts.expression, tag);
        let names = parts.evaluator.free_names();
        Self {
            kind: parts.kind,
            node,
            attribute: parts.attribute,
            expression: parts.expression,
            modifier: parts.modifier,
            evaluator: parts.evaluator,
            scope,
            label,
            names,
            last: RefCell::new(None),
            alive: Cell::new(true),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Whether the expression reads anything besides names bound in its own
    /// scope frame. Methods do not count.
    pub(crate) fn reads_outside_frame(&self) -> bool {
        self.names.iter().any(|name| {
            !self.scope.defines_here(name) && !matches!(self.scope.lookup(name), Value::Function(_))
        })
    }

    /// Drop the remembered value so the next execution writes again.
    pub(crate) fn forget(&self) {
        self.last.borrow_mut().take();
    }

    pub(crate) fn kill(&self) {
        self.alive.set(false);
    }

    pub fn last_value(&self) -> Option<Value> {
        self.last.borrow().clone()
    }

    pub(crate) fn evaluate(&self) -> Result<Value, BindingError> {
        self.evaluator
            .evaluate(&self.scope, &[])
            .map_err(|source| self.eval_error(source))
    }

    pub(crate) fn eval_error(&self, source: trellis_template::EvalError) -> BindingError {
        BindingError::Eval {
            expression: self.expression.clone(),
            source,
        }
    }

    /// Whether `value` differs from what the last execution wrote.
    pub(crate) fn changed(&self, value: &Value) -> bool {
        self.last.borrow().as_ref() != Some(value)
    }

    pub(crate) fn remember(&self, value: Value) {
        *self.last.borrow_mut() = Some(value);
    }

    pub(crate) fn bind(self: &Rc<Self>, id: BindingId, engine: &Rc<Engine>) -> Result<(), ConfigError> {
        self.kind.directive().bind(self, id, engine)
    }

    pub(crate) fn execute(
        self: &Rc<Self>,
        engine: &Rc<Engine>,
        pass: &Rc<Pass>,
    ) -> Result<Flow, BindingError> {
        self.kind.directive().execute(self, engine, pass)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind.name())
            .field("node", &self.node)
            .field("attribute", &self.attribute)
            .field("expression", &self.expression)
            .finish()
    }
}

/// A parsed directive waiting for its node and scope.
pub(crate) struct BindingParts {
    pub kind: BindingKind,
    pub attribute: String,
    pub expression: String,
    pub modifier: Option<String>,
    pub evaluator: Evaluator,
}

/// Where a directive was written; compile errors are reported against it.
pub(crate) struct Site<'a> {
    pub tag: &'a str,
    pub attribute: &'a str,
}

impl Site<'_> {
    pub fn compile(&self, source: &str, params: &[&str]) -> Result<Evaluator, ConfigError> {
        compile(source, params).map_err(|source| self.error(source))
    }

    pub fn compile_assignable(&self, source: &str, params: &[&str]) -> Result<Evaluator, ConfigError> {
        compile_assignable(source, params).map_err(|source| self.error(source))
    }

    fn error(&self, source: trellis_template::ExprError) -> ConfigError {
        ConfigError::Expression {
            tag: self.tag.to_string(),
            attribute: self.attribute.to_string(),
            source,
        }
    }
}
