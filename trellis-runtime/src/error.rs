use std::fmt;

use thiserror::Error;
use trellis_core::SchedulerError;
use trellis_dom::DomError;
use trellis_template::{EvalError, ExprError, TemplateError};

/// A broken template. Raised synchronously while compiling or mapping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("<{tag}> {attribute}: {source}")]
    Expression {
        tag: String,
        attribute: String,
        source: ExprError,
    },

    #[error("loop `{expression}` needs a `data-bind:key` on its repeated element")]
    MissingKey { expression: String },

    #[error("loop `{expression}` is malformed: {reason}")]
    InvalidLoop { expression: String, reason: String },

    #[error("data-else on <{tag}> does not follow a data-if sibling")]
    OrphanElse { tag: String },

    #[error("<{tag}> combines directives that cannot share a node: {reason}")]
    ConflictingDirectives { tag: String, reason: String },

    #[error("{attribute} on <{tag}>: no component is registered for that tag")]
    UnknownComponent { tag: String, attribute: String },

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Failure of one binding execution during an update pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("`{expression}` failed: {source}")]
    Eval {
        expression: String,
        source: EvalError,
    },

    #[error("loop `{expression}` produced duplicate key {key}")]
    DuplicateKey { expression: String, key: String },

    #[error("loop `{expression}` must iterate an array or object, got {found}")]
    NotIterable { expression: String, found: &'static str },

    #[error("row {key} could not be created: {source}")]
    RowSetup { key: String, source: ConfigError },

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Every failure of one batch, reported together.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateError {
    pub failures: Vec<(String, BindingError)>,
    pub total: usize,
}

impl AggregateError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: AggregateError) {
        self.failures.extend(other.failures);
        self.total += other.total;
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} jobs failed", self.failures.len(), self.total)?;
        for (label, err) in &self.failures {
            write!(f, "\n  {label}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpdateError {
    /// Job failures with no error handler installed to receive them.
    #[error("unhandled update failures: {0}")]
    Unhandled(AggregateError),

    #[error("update requested while a pass is running")]
    Reentrant,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Dom(#[from] DomError),
}
