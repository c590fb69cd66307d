//! # Errors
//!
//! Two error families flow through the factory:
//!
//! - **Assertion failures** (`NormError::is_assertion`): invariant violations such
//!   as copying into a non-empty memo or dispatching on an operator kind outside
//!   the expected family. These always signal and are never retried.
//! - **Recoverable failures**: evaluation errors raised while assigning
//!   placeholders. They are returned at exactly one boundary,
//!   [`Factory::assign_placeholders`](crate::factory::Factory::assign_placeholders).

use crate::catalog::TableName;
use crate::expr::{DataType, OpKind};
use std::convert::Infallible;

/// Errors produced by the factory and the copy-and-replace traversal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormError {
    #[error("destination memo must be empty")]
    DestinationNotEmpty,
    #[error("unexpected join operator: {0}")]
    UnexpectedOperator(OpKind),
    #[error("optimizer factory constructor call stack exceeded max depth of {0}")]
    MaxDepthExceeded(usize),
    #[error("expected constructor stack depth {0} to be 0")]
    NonZeroDepth(usize),
    #[error("memo root is already set")]
    RootAlreadySet,
    #[error("memo has no root expression")]
    NoRoot,
    #[error("table not found: {0}")]
    UnknownTable(TableName),
    #[error("factory has no catalog")]
    NoCatalog,
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl NormError {
    /// Whether this error reports a broken invariant rather than bad input.
    pub fn is_assertion(&self) -> bool {
        !matches!(
            self,
            NormError::Eval(_) | NormError::UnknownTable(_) | NormError::NoCatalog
        )
    }
}

impl From<Infallible> for NormError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Errors produced by the scalar evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("no value provided for placeholder ${0}")]
    NoPlaceholderValue(u16),
    #[error("expected {expected} for placeholder ${index}, found {found}")]
    PlaceholderType {
        index: u16,
        expected: DataType,
        found: DataType,
    },
    #[error("cannot evaluate {0}")]
    Unsupported(String),
    #[error("invalid argument for {func}: {reason}")]
    InvalidArgument { func: String, reason: String },
}
