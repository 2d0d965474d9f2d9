use async_trait::async_trait;
use keel_plan::{ActionRecord, DeploymentMode};
use keel_reconcile::{Action, ActionContext, ActionError, Progress};
use tracing::info;

/// Switches cluster maintenance mode and waits until it is observed.
#[derive(Debug)]
pub struct MaintenanceAction {
    member_id: String,
    enable: bool,
}

impl MaintenanceAction {
    pub fn enable(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            enable: true,
        }
    }

    pub fn disable(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            enable: false,
        }
    }
}

#[async_trait]
impl Action for MaintenanceAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        if ctx.spec().mode != DeploymentMode::Cluster {
            return Ok(true);
        }
        ctx.call(ctx.cluster().set_maintenance_mode(self.enable))
            .await?;
        info!(enabled = self.enable, "Maintenance mode requested");
        Ok(false)
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        let enabled = ctx.call(ctx.cluster().maintenance_mode()).await?;
        Ok(Progress::from(enabled == self.enable))
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}
