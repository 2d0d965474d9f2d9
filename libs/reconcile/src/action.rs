//! The action contract.

use std::time::Duration;

use async_trait::async_trait;
use keel_plan::Plan;

use crate::{ActionContext, ActionError};

/// Result of polling a started action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still running; poll again next tick.
    Pending,
    /// Finished successfully.
    Ready,
    /// Can never succeed. Compensating status changes must already be made
    /// through the context.
    Abort,
}

impl Progress {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl From<bool> for Progress {
    fn from(ready: bool) -> Self {
        if ready {
            Self::Ready
        } else {
            Self::Pending
        }
    }
}

/// One unit of work, driven across ticks by the executor.
///
/// An instance is built fresh every tick from its plan record and dropped at
/// the end of the tick. Everything that must survive between ticks goes
/// into the record through the context (scratch store, member status).
#[async_trait]
pub trait Action: Send {
    /// Issues the action's side effects.
    ///
    /// Returns `Ok(true)` when nothing remains to poll. Called again after a
    /// crash or a start failure, so it must tolerate work already done.
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError>;

    /// Polls a started action. Errors are transient.
    async fn check_progress(&mut self, ctx: &mut ActionContext<'_>)
        -> Result<Progress, ActionError>;

    /// Timeout measured from the start time. `None` uses the type's
    /// configured timeout; a zero duration never times out.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Targeted member; empty for cluster-scoped actions.
    fn member_id(&self) -> &str;

    /// Runs after success, before the record leaves the plan. An error keeps
    /// the record in place.
    async fn post(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Replaces the rest of the plan after this action completed.
    fn append_plan(&self, _remaining: &Plan) -> Option<Plan> {
        None
    }
}
