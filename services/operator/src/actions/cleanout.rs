//! Moving all shards off a dbserver before it is removed.

use async_trait::async_trait;
use keel_plan::{ActionRecord, ConditionType, MemberPhase, ServerGroup};
use keel_reconcile::{Action, ActionContext, ActionError, JobStatus, Progress};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CleanOutMemberAction {
    member_id: String,
}

impl CleanOutMemberAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for CleanOutMemberAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let Some(member) = ctx.member(&self.member_id).cloned() else {
            debug!(member_id = %self.member_id, "Member gone, nothing to clean out");
            return Ok(true);
        };
        if member.group != ServerGroup::DbServers {
            return Ok(true);
        }

        // A job submitted before a crash is still running; attach to it.
        let job_id = match member.cleanout_job_id {
            Some(job_id) => job_id,
            None => {
                ctx.call(ctx.cluster().clean_out_server(&self.member_id))
                    .await?
            }
        };
        info!(member_id = %self.member_id, job_id = %job_id, "Cleanout job running");

        ctx.update_member(&self.member_id, |m| {
            m.phase = MemberPhase::CleanOut;
            m.cleanout_job_id = Some(job_id);
        });
        Ok(false)
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        let Some(member) = ctx.member(&self.member_id).cloned() else {
            return Ok(Progress::Ready);
        };
        if !member.initialized {
            return Ok(Progress::Ready);
        }

        match ctx.call(ctx.cluster().is_cleaned_out(&self.member_id)).await {
            Ok(true) => {
                let now = ctx.now();
                ctx.update_member(&self.member_id, |m| {
                    m.set_condition(ConditionType::CleanedOut, true, "CleanoutFinished", now);
                });
                return Ok(Progress::Ready);
            }
            Ok(false) => {}
            Err(err) => {
                debug!(member_id = %self.member_id, error = %err, "Cleanout state unknown");
                return Ok(Progress::Pending);
            }
        }

        let Some(job_id) = member.cleanout_job_id else {
            return Ok(Progress::Pending);
        };
        match ctx.call(ctx.cluster().job_status(&job_id)).await {
            Ok(JobStatus::Failed(reason)) => {
                warn!(member_id = %self.member_id, job_id = %job_id, reason = %reason, "Cleanout job failed");
                ctx.update_member(&self.member_id, |m| {
                    m.phase = MemberPhase::Created;
                    m.cleanout_job_id = None;
                });
                ctx.notice(format!("cleanout job {job_id} failed: {reason}"));
                Ok(Progress::Abort)
            }
            Ok(_) => Ok(Progress::Pending),
            Err(err) => {
                debug!(job_id = %job_id, error = %err, "Cleanout job state unknown");
                Ok(Progress::Pending)
            }
        }
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}
