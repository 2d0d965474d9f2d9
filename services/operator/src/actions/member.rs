//! Status-only member bookkeeping, plus server removal.

use async_trait::async_trait;
use keel_plan::{ActionRecord, ConditionType, MemberPhase};
use keel_reconcile::{Action, ActionContext, ActionError, ClusterError, Progress};
use tracing::{info, warn};

// =============================================================================
// RemoveMember
// =============================================================================

#[derive(Debug)]
pub struct RemoveMemberAction {
    member_id: String,
}

impl RemoveMemberAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for RemoveMemberAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        match ctx.call(ctx.cluster().remove_server(&self.member_id)).await {
            Ok(()) | Err(ActionError::Cluster(ClusterError::NotFound(_))) => {}
            Err(err) => return Err(err),
        }
        if ctx.remove_member(&self.member_id).is_some() {
            info!(member_id = %self.member_id, "Member removed");
        }
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

// =============================================================================
// MarkToRemoveMember
// =============================================================================

#[derive(Debug)]
pub struct MarkToRemoveMemberAction {
    member_id: String,
    reason: String,
}

impl MarkToRemoveMemberAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            reason: record.reason.clone(),
        }
    }
}

#[async_trait]
impl Action for MarkToRemoveMemberAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let now = ctx.now();
        let reason = self.reason.clone();
        ctx.update_member(&self.member_id, |m| {
            m.set_condition(ConditionType::MarkedToRemove, true, reason, now);
        });
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

// =============================================================================
// MemberPhaseUpdate
// =============================================================================

pub const PHASE_PARAM: &str = "phase";

#[derive(Debug)]
pub struct MemberPhaseUpdateAction {
    member_id: String,
    phase: Option<String>,
}

impl MemberPhaseUpdateAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            phase: record.param(PHASE_PARAM).map(str::to_string),
        }
    }
}

#[async_trait]
impl Action for MemberPhaseUpdateAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let parsed = self
            .phase
            .as_deref()
            .ok_or_else(|| "missing".to_string())
            .and_then(|p| p.parse::<MemberPhase>().map_err(|e| e.to_string()));
        let phase = match parsed {
            Ok(phase) => phase,
            Err(message) => {
                // Retrying cannot fix a bad parameter; drop the record.
                let err = ActionError::InvalidParam {
                    key: PHASE_PARAM.to_string(),
                    message,
                };
                warn!(member_id = %self.member_id, error = %err, "Skipping phase update");
                ctx.notice(err.to_string());
                return Ok(true);
            }
        };

        ctx.update_member(&self.member_id, |m| m.phase = phase);
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

// =============================================================================
// SetMemberConditionV2
// =============================================================================

pub const CONDITION_TYPE_PARAM: &str = "conditionType";
pub const CONDITION_VALUE_PARAM: &str = "conditionValue";
pub const CONDITION_REASON_PARAM: &str = "reason";

/// Sets a member condition, or removes it when no value is given.
#[derive(Debug)]
pub struct SetMemberConditionAction {
    member_id: String,
    condition_type: Option<String>,
    value: Option<String>,
    reason: String,
}

impl SetMemberConditionAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            condition_type: record.param(CONDITION_TYPE_PARAM).map(str::to_string),
            value: record.param(CONDITION_VALUE_PARAM).map(str::to_string),
            reason: record
                .param(CONDITION_REASON_PARAM)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn invalid(&self, ctx: &mut ActionContext<'_>, key: &str, message: String) {
        let err = ActionError::InvalidParam {
            key: key.to_string(),
            message,
        };
        warn!(member_id = %self.member_id, error = %err, "Skipping condition update");
        ctx.notice(err.to_string());
    }
}

#[async_trait]
impl Action for SetMemberConditionAction {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        let Some(condition_type) = self.condition_type.as_deref().map(ConditionType::from) else {
            self.invalid(ctx, CONDITION_TYPE_PARAM, "missing".to_string());
            return Ok(true);
        };

        let value = match self.value.as_deref().map(str::parse::<bool>) {
            None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                self.invalid(ctx, CONDITION_VALUE_PARAM, err.to_string());
                return Ok(true);
            }
        };

        let now = ctx.now();
        let reason = self.reason.clone();
        ctx.update_member(&self.member_id, |m| match value {
            Some(status) => {
                m.set_condition(condition_type, status, reason, now);
            }
            None => {
                m.remove_condition(&condition_type);
            }
        });
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
