use thiserror::Error;

/// Markup that cannot be turned into a template tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unexpected closing tag </{tag}> at byte {offset}")]
    UnexpectedClosingTag { tag: String, offset: usize },

    #[error("<{tag}> is never closed")]
    UnclosedTag { tag: String },

    #[error("unterminated attribute value at byte {offset}")]
    UnterminatedQuote { offset: usize },

    #[error("unterminated comment at byte {offset}")]
    UnterminatedComment { offset: usize },

    #[error("expected a tag name at byte {offset}")]
    MissingTagName { offset: usize },
}

/// An expression that fails to compile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("malformed expression `{expression}`: {message}")]
    Syntax { expression: String, message: String },

    #[error("assignment is only allowed in model bindings: `{expression}`")]
    AssignmentNotAllowed { expression: String },
}

/// A compiled expression that fails while being evaluated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("cannot read property `{property}` of null")]
    NullAccess { property: String },

    #[error("cannot set property `{property}` on {target}")]
    SetProperty { property: String, target: String },

    #[error("`{callee}` is not a function")]
    NotCallable { callee: String },

    #[error("{function} failed: {message}")]
    Host { function: String, message: String },

    #[error("cannot assign to parameter `{name}`")]
    AssignToParameter { name: String },

    #[error("writing `{name}` back to its source failed: {message}")]
    WriteBack { name: String, message: String },

    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}
