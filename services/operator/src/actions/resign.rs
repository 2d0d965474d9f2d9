//! Handing over shard leadership before a dbserver goes down.

use async_trait::async_trait;
use keel_plan::{ActionRecord, DeploymentMode, ServerGroup};
use keel_reconcile::{Action, ActionContext, ActionError, JobStatus, Progress};
use tracing::{info, warn};

/// Scratch key holding the resign job id.
pub const RESIGN_JOB_KEY: &str = "resignLeadershipJobID";

#[derive(Debug)]
pub struct ResignLeadershipAction {
    member_id: String,
    group: ServerGroup,
}

impl ResignLeadershipAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            group: record.group,
        }
    }

    fn applies(&self, ctx: &ActionContext<'_>) -> bool {
        ctx.spec().mode == DeploymentMode::Cluster
            && self.group == ServerGroup::DbServers
            && ctx.member(&self.member_id).is_some()
    }

    async fn in_maintenance(&self, ctx: &ActionContext<'_>) -> Result<bool, ActionError> {
        if !ctx.spec().maintenance_aware_resign {
            return Ok(false);
        }
        ctx.call(ctx.cluster().maintenance_mode()).await
    }

    async fn submit(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let job_id = ctx
            .call(ctx.cluster().resign_leadership(&self.member_id))
            .await?;
        info!(member_id = %self.member_id, job_id = %job_id, "Resign leadership job submitted");
        ctx.scratch().add(RESIGN_JOB_KEY, job_id);
        Ok(())
    }
}

#[async_trait]
impl Action for ResignLeadershipAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        if !self.applies(ctx) {
            return Ok(true);
        }
        if let Some(job_id) = ctx.scratch().get(RESIGN_JOB_KEY).map(str::to_string) {
            info!(member_id = %self.member_id, job_id = %job_id, "Re-attaching to resign leadership job");
            return Ok(false);
        }
        if self.in_maintenance(ctx).await? {
            ctx.notice("cluster is in maintenance mode, skipping leadership resignation");
            return Ok(true);
        }

        self.submit(ctx).await?;
        Ok(false)
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        if !self.applies(ctx) || self.in_maintenance(ctx).await? {
            return Ok(Progress::Ready);
        }

        let Some(job_id) = ctx.scratch().get(RESIGN_JOB_KEY).map(str::to_string) else {
            // The previous job concluded without the member losing its leaders.
            self.submit(ctx).await?;
            return Ok(Progress::Pending);
        };

        match ctx.call(ctx.cluster().job_status(&job_id)).await? {
            JobStatus::Finished => {
                ctx.scratch().clear(RESIGN_JOB_KEY);
                Ok(Progress::Ready)
            }
            JobStatus::Failed(reason) => {
                warn!(member_id = %self.member_id, job_id = %job_id, reason = %reason, "Resign leadership job failed");
                ctx.scratch().clear(RESIGN_JOB_KEY);
                self.leadership_gone(ctx).await
            }
            JobStatus::NotFound => {
                ctx.scratch().clear(RESIGN_JOB_KEY);
                self.leadership_gone(ctx).await
            }
            JobStatus::Pending | JobStatus::Running => Ok(Progress::Pending),
        }
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}

impl ResignLeadershipAction {
    /// Ready if the member leads nothing anymore; otherwise wait for a resubmit.
    async fn leadership_gone(&self, ctx: &ActionContext<'_>) -> Result<Progress, ActionError> {
        let leads = ctx.call(ctx.cluster().leads_shards(&self.member_id)).await?;
        Ok(if leads {
            Progress::Pending
        } else {
            Progress::Ready
        })
    }
}
