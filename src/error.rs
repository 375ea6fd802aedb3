//! Typed errors for rules callers may want to match on.
//!
//! Storage faults stay `anyhow::Error`; these cover domain rule violations only.

use crate::analysis::RunStatus;
use thiserror::Error;

/// A rejected analysis run status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunStatusError {
    /// The run already reached SUCCESS or FAILED.
    #[error("analysis run {id} is already in final state {status}")]
    AlreadyFinal { id: i64, status: RunStatus },

    /// The requested move is not a forward step from the current status.
    #[error("analysis run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: RunStatus,
        to: RunStatus,
    },
}

/// A stored value that does not decode into a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}
