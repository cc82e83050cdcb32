use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node does not exist (removed or never created)")]
    UnknownNode,

    #[error("node is not attached to a parent")]
    Detached,

    #[error("only elements and the root can hold children")]
    NotAContainer,

    #[error("node is not an element")]
    NotAnElement,

    #[error("inserting the node would create a cycle")]
    Cycle,

    #[error("the document root cannot be removed")]
    RootRemoval,

    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
}
