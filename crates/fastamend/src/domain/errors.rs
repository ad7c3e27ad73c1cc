//! Domain-specific errors.

use thiserror::Error;

/// A target address string that does not match the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse target address `{input}`")]
pub struct ParseError {
    pub input: String,
}

impl ParseError {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A selection edit that the current selection state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("`{dir}` is covered by a recursive selection on an ancestor directory")]
    BlockedByParent { dir: String },
    #[error("`{dir}` has a whole-directory selection active; deselect it first")]
    GroupSelectionActive { dir: String },
}
