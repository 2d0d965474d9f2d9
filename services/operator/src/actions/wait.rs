use async_trait::async_trait;
use keel_plan::{ActionRecord, ConditionType};
use keel_reconcile::{Action, ActionContext, ActionError, Progress};

/// Waits until cluster health reports the member as good.
#[derive(Debug)]
pub struct WaitForMemberUpAction {
    member_id: String,
}

impl WaitForMemberUpAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for WaitForMemberUpAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        Ok(self.check_progress(ctx).await?.is_ready())
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        if ctx.member(&self.member_id).is_none() {
            ctx.notice(format!("member {} is gone, not waiting for it", self.member_id));
            return Ok(Progress::Ready);
        }
        if !ctx.call(ctx.cluster().is_server_up(&self.member_id)).await? {
            return Ok(Progress::Pending);
        }

        let now = ctx.now();
        ctx.update_member(&self.member_id, |m| {
            m.set_condition(ConditionType::Ready, true, "MemberUp", now);
            m.remove_condition(&ConditionType::Terminating);
        });
        Ok(Progress::Ready)
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}
