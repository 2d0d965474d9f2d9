//! Shutting down and rotating members.
//!
//! Both actions are registered behind the start failure grace period: a
//! member that was just told to stop often fails health queries for a while.

use async_trait::async_trait;
use keel_plan::{ActionRecord, ConditionType, MemberPhase};
use keel_reconcile::{Action, ActionContext, ActionError, Progress};
use tracing::info;

/// Scratch key set once a rotation's shutdown has been requested.
pub const RESTART_REQUESTED_KEY: &str = "restartRequested";

/// Scratch key set once the rotating member was seen down.
const MEMBER_DOWN_KEY: &str = "memberDown";

#[derive(Debug)]
pub struct ShutdownMemberAction {
    member_id: String,
}

impl ShutdownMemberAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for ShutdownMemberAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let Some(member) = ctx.member(&self.member_id).cloned() else {
            return Ok(true);
        };
        ctx.call(ctx.cluster().shutdown_server(&member)).await?;
        info!(member_id = %self.member_id, "Member shutdown requested");

        let now = ctx.now();
        ctx.update_member(&self.member_id, |m| {
            m.set_condition(ConditionType::Terminating, true, "ShutdownRequested", now);
        });
        Ok(false)
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        if ctx.member(&self.member_id).is_none() {
            return Ok(Progress::Ready);
        }
        let up = ctx.call(ctx.cluster().is_server_up(&self.member_id)).await?;
        Ok(Progress::from(!up))
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}

#[derive(Debug)]
pub struct RotateMemberAction {
    member_id: String,
}

impl RotateMemberAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for RotateMemberAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let Some(member) = ctx.member(&self.member_id).cloned() else {
            return Ok(true);
        };
        if ctx.scratch().contains(RESTART_REQUESTED_KEY) {
            return Ok(false);
        }
        ctx.call(ctx.cluster().shutdown_server(&member)).await?;
        info!(member_id = %self.member_id, "Member rotation requested");

        let now = ctx.now();
        ctx.scratch().add(RESTART_REQUESTED_KEY, now.to_rfc3339());
        ctx.update_member(&self.member_id, |m| m.phase = MemberPhase::Rotating);
        Ok(false)
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        if ctx.member(&self.member_id).is_none() {
            return Ok(Progress::Ready);
        }
        let up = ctx.call(ctx.cluster().is_server_up(&self.member_id)).await?;

        // The old process may still answer right after the shutdown request.
        if !ctx.scratch().contains(MEMBER_DOWN_KEY) {
            if !up {
                ctx.scratch().add(MEMBER_DOWN_KEY, "true");
            }
            return Ok(Progress::Pending);
        }
        if !up {
            return Ok(Progress::Pending);
        }

        ctx.update_member(&self.member_id, |m| m.phase = MemberPhase::Created);
        Ok(Progress::Ready)
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}
