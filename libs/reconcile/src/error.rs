//! Error types for plan execution.

use std::time::Duration;

use keel_plan::ActionType;
use thiserror::Error;

use crate::{ClusterError, StoreError};

/// Transient failure reported by an action.
///
/// The executor never removes a record because of one of these; the same
/// call is repeated on a later tick.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// An external call exceeded the per-call timeout.
    #[error("external call timed out after {0:?}")]
    CallTimeout(Duration),

    #[error("invalid parameter {key}: {message}")]
    InvalidParam { key: String, message: String },

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors that stop reconciliation of a deployment.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The plan holds a type this build cannot run.
    #[error("action type {action_type} is not registered (deployment {deployment})")]
    UnregisteredAction {
        deployment: String,
        action_type: ActionType,
    },

    #[error("status store error: {0}")]
    Store(#[from] StoreError),
}

impl ExecutorError {
    /// True when retrying the tick cannot help.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnregisteredAction { .. } => true,
            Self::Store(err) => !err.is_transient(),
        }
    }
}
