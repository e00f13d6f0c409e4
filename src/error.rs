//! Error taxonomy of the optimizer and job compiler.
//!
//! All fallible operations return [`OptResult`]. Faults are raised as an [`OptError`] wrapped
//! into `anyhow::Error`, so callers that need to tell the categories apart can use
//! `err.downcast_ref::<OptError>()`.

use thiserror::Error;

use crate::expr::{FunctionIdentifier, LogicalVariable};
use crate::plan::OperatorId;

pub type OptResult<T> = anyhow::Result<T>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptError {
    /// A physical requirement cannot be reconciled with what an input delivers.
    #[error("unsatisfiable requirement: {0}")]
    Unsatisfiable(String),

    /// A recognized branch that is not supported yet. Never approximated.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("malformed expression {expr}: {reason}")]
    MalformedExpression { expr: String, reason: String },

    #[error("malformed operator {operator}: {reason}")]
    MalformedOperator { operator: OperatorId, reason: String },

    #[error("unknown function {0}")]
    UnknownFunction(FunctionIdentifier),

    #[error("variable {variable} is not in scope of operator {operator}")]
    VariableOutOfScope {
        operator: OperatorId,
        variable: LogicalVariable,
    },

    #[error("job generation failed: {0}")]
    Compilation(String),
}

impl OptError {
    pub fn malformed_operator<S: Into<String>>(operator: OperatorId, reason: S) -> Self {
        Self::MalformedOperator {
            operator,
            reason: reason.into(),
        }
    }

    pub fn not_implemented<S: Into<String>>(what: S) -> Self {
        Self::NotImplemented(what.into())
    }
}

/// Returns the typed category of an error, if it carries one.
pub fn error_kind(err: &anyhow::Error) -> Option<&OptError> {
    err.downcast_ref::<OptError>()
}
