//! Concrete actions and the table that registers them.

use std::time::Duration;

use keel_plan::ActionType;
use keel_reconcile::{factory, with_start_failure_grace_period, ActionRegistry, RegistryError};

mod cleanout;
mod idle;
mod maintenance;
mod member;
mod resign;
mod restart;
mod wait;

pub use cleanout::CleanOutMemberAction;
pub use idle::IdleAction;
pub use maintenance::MaintenanceAction;
pub use member::{
    MarkToRemoveMemberAction, MemberPhaseUpdateAction, RemoveMemberAction,
    SetMemberConditionAction, CONDITION_REASON_PARAM, CONDITION_TYPE_PARAM,
    CONDITION_VALUE_PARAM, PHASE_PARAM,
};
pub use resign::{ResignLeadershipAction, RESIGN_JOB_KEY};
pub use restart::{RotateMemberAction, ShutdownMemberAction, RESTART_REQUESTED_KEY};
pub use wait::WaitForMemberUpAction;

/// Progress errors this soon after a shutdown or rotation started are ignored.
pub const RESTART_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Registry with every action type this operator knows.
pub fn default_registry() -> Result<ActionRegistry, RegistryError> {
    let mut builder = ActionRegistry::builder()
        .register(ActionType::Idle, factory(IdleAction::new))?
        .register(ActionType::CleanOutMember, factory(CleanOutMemberAction::new))?
        .register(ActionType::ResignLeadership, factory(ResignLeadershipAction::new))?
        .register(
            ActionType::ShutdownMember,
            with_start_failure_grace_period(
                factory(ShutdownMemberAction::new),
                RESTART_GRACE_PERIOD,
            ),
        )?
        .register(
            ActionType::RotateMember,
            with_start_failure_grace_period(factory(RotateMemberAction::new), RESTART_GRACE_PERIOD),
        )?
        .register(ActionType::WaitForMemberUp, factory(WaitForMemberUpAction::new))?
        .register(ActionType::RemoveMember, factory(RemoveMemberAction::new))?
        .register(ActionType::MarkToRemoveMember, factory(MarkToRemoveMemberAction::new))?
        .register(ActionType::MemberPhaseUpdate, factory(MemberPhaseUpdateAction::new))?
        .register(ActionType::SetMemberConditionV2, factory(SetMemberConditionAction::new))?
        .register(ActionType::EnableMaintenance, factory(MaintenanceAction::enable))?
        .register(ActionType::DisableMaintenance, factory(MaintenanceAction::disable))?;
    for action_type in ActionType::ALL.into_iter().filter(ActionType::is_deprecated) {
        builder = builder.register_deprecated(action_type)?;
    }
    Ok(builder.build())
}
