use async_trait::async_trait;
use keel_plan::ActionRecord;
use keel_reconcile::{Action, ActionContext, ActionError, Progress};

/// Does nothing. Used to pad plans and in tests.
#[derive(Debug)]
pub struct IdleAction {
    member_id: String,
}

impl IdleAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for IdleAction {
    async fn start(&mut self, _ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        Ok(true)
    }

    async fn check_progress(
        &mut self,
        _ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        Ok(Progress::Ready)
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}
