//! Event type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Action lifecycle
    pub const ACTION_STARTED: &str = "action.started";
    pub const ACTION_COMPLETED: &str = "action.completed";
    pub const ACTION_START_FAILED: &str = "action.start_failed";
    pub const ACTION_ABORTED: &str = "action.aborted";
    pub const ACTION_TIMED_OUT: &str = "action.timed_out";
    pub const ACTION_TIMEOUT_RETRIED: &str = "action.timeout_retried";
    pub const ACTION_NOTICE: &str = "action.notice";

    // Plan lifecycle
    pub const PLAN_ABORTED: &str = "plan.aborted";
    pub const PLAN_GENERATED: &str = "plan.generated";
}

/// Kind of a plan event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlanEventKind {
    ActionStarted,
    ActionCompleted,
    ActionStartFailed,
    ActionAborted,
    ActionTimedOut,
    ActionTimeoutRetried,
    ActionNotice,
    PlanAborted,
    PlanGenerated,
}

impl PlanEventKind {
    pub fn as_str(&self) -> &'static str {
        use event_types::*;
        match self {
            Self::ActionStarted => ACTION_STARTED,
            Self::ActionCompleted => ACTION_COMPLETED,
            Self::ActionStartFailed => ACTION_START_FAILED,
            Self::ActionAborted => ACTION_ABORTED,
            Self::ActionTimedOut => ACTION_TIMED_OUT,
            Self::ActionTimeoutRetried => ACTION_TIMEOUT_RETRIED,
            Self::ActionNotice => ACTION_NOTICE,
            Self::PlanAborted => PLAN_ABORTED,
            Self::PlanGenerated => PLAN_GENERATED,
        }
    }

    /// Default severity for this kind.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ActionStartFailed
            | Self::ActionAborted
            | Self::ActionTimedOut
            | Self::ActionTimeoutRetried
            | Self::PlanAborted => Severity::Warning,
            _ => Severity::Normal,
        }
    }
}

impl fmt::Display for PlanEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanEventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use event_types::*;
        Ok(match s {
            ACTION_STARTED => Self::ActionStarted,
            ACTION_COMPLETED => Self::ActionCompleted,
            ACTION_START_FAILED => Self::ActionStartFailed,
            ACTION_ABORTED => Self::ActionAborted,
            ACTION_TIMED_OUT => Self::ActionTimedOut,
            ACTION_TIMEOUT_RETRIED => Self::ActionTimeoutRetried,
            ACTION_NOTICE => Self::ActionNotice,
            PLAN_ABORTED => Self::PlanAborted,
            PLAN_GENERATED => Self::PlanGenerated,
            other => return Err(EventError::UnknownEventType(other.to_string())),
        })
    }
}

impl TryFrom<String> for PlanEventKind {
    type Error = EventError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlanEventKind> for String {
    fn from(kind: PlanEventKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
}

/// How a record left (or failed to enter) the in-flight state.
///
/// Counters are keyed by action type and outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Aborted,
    TimedOut,
    StartFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Aborted => "aborted",
            Self::TimedOut => "timed_out",
            Self::StartFailed => "start_failed",
        }
    }

    /// True for outcomes that removed the record as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Aborted | Self::TimedOut)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
