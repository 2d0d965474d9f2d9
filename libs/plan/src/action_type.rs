//! Action type catalogue.
//!
//! Every behavior the executor can run is named by an [`ActionType`]. The
//! type also carries the static policy the executor needs before it has
//! constructed anything: which plan the action belongs to, how long it may
//! run, and what happens when it runs out of time.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timeouts::ACTIONS_DEFAULT_TIMEOUT;
use crate::PlanError;

/// Tag identifying the behavior of a plan record.
///
/// Serialized as the PascalCase variant name. An unknown name fails to
/// decode, which surfaces as a fatal status decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Does nothing; used to trigger a re-evaluation.
    Idle,
    /// Moves all shards off a dbserver.
    CleanOutMember,
    /// Hands over shard leadership held by a dbserver.
    ResignLeadership,
    /// Shuts a member down and waits until it is gone.
    ShutdownMember,
    /// Restarts a member and waits until it is back.
    RotateMember,
    /// Waits until a member reports healthy.
    WaitForMemberUp,
    /// Removes a member from the cluster and from status.
    RemoveMember,
    /// Flags a member for removal.
    MarkToRemoveMember,
    /// Sets the phase of a member.
    MemberPhaseUpdate,
    /// Sets or clears a condition on a member.
    SetMemberConditionV2,
    /// Turns cluster maintenance mode on.
    EnableMaintenance,
    /// Turns cluster maintenance mode off.
    DisableMaintenance,
    /// Deprecated; kept so that old plans still decode.
    SetCondition,
    /// Deprecated; kept so that old plans still decode.
    SetMemberCondition,
}

impl ActionType {
    /// All known action types, in declaration order.
    pub const ALL: [ActionType; 14] = [
        Self::Idle,
        Self::CleanOutMember,
        Self::ResignLeadership,
        Self::ShutdownMember,
        Self::RotateMember,
        Self::WaitForMemberUp,
        Self::RemoveMember,
        Self::MarkToRemoveMember,
        Self::MemberPhaseUpdate,
        Self::SetMemberConditionV2,
        Self::EnableMaintenance,
        Self::DisableMaintenance,
        Self::SetCondition,
        Self::SetMemberCondition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CleanOutMember => "CleanOutMember",
            Self::ResignLeadership => "ResignLeadership",
            Self::ShutdownMember => "ShutdownMember",
            Self::RotateMember => "RotateMember",
            Self::WaitForMemberUp => "WaitForMemberUp",
            Self::RemoveMember => "RemoveMember",
            Self::MarkToRemoveMember => "MarkToRemoveMember",
            Self::MemberPhaseUpdate => "MemberPhaseUpdate",
            Self::SetMemberConditionV2 => "SetMemberConditionV2",
            Self::EnableMaintenance => "EnableMaintenance",
            Self::DisableMaintenance => "DisableMaintenance",
            Self::SetCondition => "SetCondition",
            Self::SetMemberCondition => "SetMemberCondition",
        }
    }

    /// Compiled-in timeout, used unless the deployment overrides it.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::CleanOutMember => Duration::from_secs(48 * 60 * 60),
            Self::ResignLeadership | Self::ShutdownMember | Self::WaitForMemberUp => {
                Duration::from_secs(30 * 60)
            }
            Self::RotateMember | Self::RemoveMember => Duration::from_secs(15 * 60),
            _ => ACTIONS_DEFAULT_TIMEOUT,
        }
    }

    /// Plan this type is scheduled on.
    pub fn priority(&self) -> PlanKind {
        match self {
            Self::MemberPhaseUpdate
            | Self::SetMemberConditionV2
            | Self::SetCondition
            | Self::SetMemberCondition => PlanKind::High,
            _ => PlanKind::Normal,
        }
    }

    /// What the executor does once the timeout has elapsed.
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        match self {
            Self::ResignLeadership | Self::WaitForMemberUp => TimeoutPolicy::RetryOnce,
            _ => TimeoutPolicy::Abort,
        }
    }

    /// Deprecated types only drain from old plans.
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::SetCondition | Self::SetMemberCondition)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PlanError::UnknownActionType(s.to_string()))
    }
}

/// The two queues a deployment status carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Short bookkeeping actions; executed before the normal plan each tick.
    High,
    Normal,
}

impl PlanKind {
    /// Execution order within one tick.
    pub const ORDERED: [PlanKind; 2] = [PlanKind::High, PlanKind::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            other => Err(PlanError::UnknownPlanKind(other.to_string())),
        }
    }
}

/// Per-type handling of an elapsed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Handle the timeout like an abort.
    #[default]
    Abort,
    /// Reset the start time once; abort on the second timeout.
    RetryOnce,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ActionType::Idle, 600)]
    #[case(ActionType::CleanOutMember, 172_800)]
    #[case(ActionType::ResignLeadership, 1_800)]
    #[case(ActionType::ShutdownMember, 1_800)]
    #[case(ActionType::RotateMember, 900)]
    #[case(ActionType::RemoveMember, 900)]
    #[case(ActionType::WaitForMemberUp, 1_800)]
    #[case(ActionType::EnableMaintenance, 600)]
    fn test_default_timeouts(#[case] action_type: ActionType, #[case] secs: u64) {
        assert_eq!(action_type.default_timeout(), Duration::from_secs(secs));
    }

    #[test]
    fn test_name_round_trips_for_every_type() {
        for t in ActionType::ALL {
            assert_eq!(t.as_str().parse::<ActionType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(
            "Teleport".parse::<ActionType>(),
            Err(PlanError::UnknownActionType("Teleport".to_string()))
        );
        assert!(serde_json::from_str::<ActionType>("\"Teleport\"").is_err());
    }

    #[test]
    fn test_priorities() {
        assert_eq!(ActionType::MemberPhaseUpdate.priority(), PlanKind::High);
        assert_eq!(ActionType::SetMemberConditionV2.priority(), PlanKind::High);
        assert_eq!(ActionType::CleanOutMember.priority(), PlanKind::Normal);
    }

    #[test]
    fn test_timeout_policy_is_explicit() {
        assert_eq!(ActionType::CleanOutMember.timeout_policy(), TimeoutPolicy::Abort);
        assert_eq!(
            ActionType::WaitForMemberUp.timeout_policy(),
            TimeoutPolicy::RetryOnce
        );
    }

    #[test]
    fn test_plan_kind_order() {
        assert_eq!(PlanKind::ORDERED, [PlanKind::High, PlanKind::Normal]);
        assert_eq!("normal".parse::<PlanKind>().unwrap(), PlanKind::Normal);
    }
}
