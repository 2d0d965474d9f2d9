//! Member status as seen by actions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PlanError;

/// Role of a member in the database cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ServerGroup {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "agent")]
    Agents,
    #[serde(rename = "dbserver")]
    DbServers,
    #[serde(rename = "coordinator")]
    Coordinators,
    #[serde(rename = "syncmaster")]
    SyncMasters,
    #[serde(rename = "syncworker")]
    SyncWorkers,
}

impl ServerGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Single => "single",
            Self::Agents => "agent",
            Self::DbServers => "dbserver",
            Self::Coordinators => "coordinator",
            Self::SyncMasters => "syncmaster",
            Self::SyncWorkers => "syncworker",
        }
    }
}

impl fmt::Display for ServerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerGroup {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "single" => Ok(Self::Single),
            "agent" => Ok(Self::Agents),
            "dbserver" => Ok(Self::DbServers),
            "coordinator" => Ok(Self::Coordinators),
            "syncmaster" => Ok(Self::SyncMasters),
            "syncworker" => Ok(Self::SyncWorkers),
            other => Err(PlanError::UnknownServerGroup(other.to_string())),
        }
    }
}

/// Lifecycle phase of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemberPhase {
    /// Not yet created.
    #[default]
    #[serde(rename = "")]
    None,
    Pending,
    Created,
    Failed,
    /// Shards are being moved off the member.
    CleanOut,
    /// The member is being drained and will be removed.
    Draining,
    Resigned,
    Upgrading,
    Rotating,
}

impl MemberPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::Failed => "Failed",
            Self::CleanOut => "CleanOut",
            Self::Draining => "Draining",
            Self::Resigned => "Resigned",
            Self::Upgrading => "Upgrading",
            Self::Rotating => "Rotating",
        }
    }
}

impl fmt::Display for MemberPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberPhase {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "Pending" => Ok(Self::Pending),
            "Created" => Ok(Self::Created),
            "Failed" => Ok(Self::Failed),
            "CleanOut" => Ok(Self::CleanOut),
            "Draining" => Ok(Self::Draining),
            "Resigned" => Ok(Self::Resigned),
            "Upgrading" => Ok(Self::Upgrading),
            "Rotating" => Ok(Self::Rotating),
            other => Err(PlanError::UnknownMemberPhase(other.to_string())),
        }
    }
}

/// Condition kinds tracked on members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    /// All shards have been moved off the member.
    CleanedOut,
    MarkedToRemove,
    Terminating,
    PendingRestart,
    /// Any condition name this model does not know about.
    #[serde(untagged)]
    Other(String),
}

impl ConditionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "Ready",
            Self::CleanedOut => "CleanedOut",
            Self::MarkedToRemove => "MarkedToRemove",
            Self::Terminating => "Terminating",
            Self::PendingRestart => "PendingRestart",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for ConditionType {
    fn from(s: &str) -> Self {
        match s {
            "Ready" => Self::Ready,
            "CleanedOut" => Self::CleanedOut,
            "MarkedToRemove" => Self::MarkedToRemove,
            "Terminating" => Self::Terminating,
            "PendingRestart" => Self::PendingRestart,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Status of one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub id: String,
    pub group: ServerGroup,
    #[serde(default)]
    pub phase: MemberPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Agency job moving shards off this member.
    #[serde(default, rename = "cleanoutJobID", skip_serializing_if = "Option::is_none")]
    pub cleanout_job_id: Option<String>,
    /// Direct endpoint of the member, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// True once the member has joined the cluster at least once.
    #[serde(default)]
    pub initialized: bool,
}

impl MemberStatus {
    pub fn new(id: impl Into<String>, group: ServerGroup) -> Self {
        Self {
            id: id.into(),
            group,
            phase: MemberPhase::Created,
            conditions: Vec::new(),
            cleanout_job_id: None,
            endpoint: None,
            initialized: true,
        }
    }

    pub fn condition(&self, condition_type: &ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| &c.condition_type == condition_type)
    }

    pub fn is_condition_true(&self, condition_type: &ConditionType) -> bool {
        self.condition(condition_type).is_some_and(|c| c.status)
    }

    /// Sets a condition, returning true if anything changed.
    ///
    /// The transition time only moves when the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: bool,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let reason = reason.into();
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) if existing.status == status && existing.reason == reason => false,
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = now;
                }
                existing.status = status;
                existing.reason = reason;
                true
            }
            None => {
                self.conditions.push(Condition {
                    condition_type,
                    status,
                    reason,
                    message: String::new(),
                    last_transition_time: now,
                });
                true
            }
        }
    }

    /// Removes a condition, returning true if it was present.
    pub fn remove_condition(&mut self, condition_type: &ConditionType) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| &c.condition_type != condition_type);
        before != self.conditions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_set_condition_tracks_transitions() {
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(5);
        let mut member = MemberStatus::new("PRMR-1", ServerGroup::DbServers);

        assert!(member.set_condition(ConditionType::CleanedOut, true, "", t0));
        assert!(!member.set_condition(ConditionType::CleanedOut, true, "", t1));
        assert!(member.is_condition_true(&ConditionType::CleanedOut));

        assert!(member.set_condition(ConditionType::CleanedOut, false, "reverted", t1));
        let cond = member.condition(&ConditionType::CleanedOut).unwrap();
        assert_eq!(cond.last_transition_time, t1);
        assert!(!cond.status);
    }

    #[test]
    fn test_remove_condition() {
        let mut member = MemberStatus::new("CRDN-1", ServerGroup::Coordinators);
        member.set_condition(ConditionType::MarkedToRemove, true, "", Utc::now());
        assert!(member.remove_condition(&ConditionType::MarkedToRemove));
        assert!(!member.remove_condition(&ConditionType::MarkedToRemove));
    }

    #[test]
    fn test_unknown_condition_type_survives_decode() {
        let json = r#"{"type":"Custom","status":true,"lastTransitionTime":"2024-01-01T00:00:00Z"}"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.condition_type, ConditionType::Other("Custom".to_string()));
        assert_eq!(ConditionType::from("CleanedOut"), ConditionType::CleanedOut);
    }

    #[test]
    fn test_group_and_phase_names() {
        assert_eq!("dbserver".parse::<ServerGroup>().unwrap(), ServerGroup::DbServers);
        assert_eq!(
            serde_json::to_string(&ServerGroup::Agents).unwrap(),
            "\"agent\""
        );
        assert_eq!("CleanOut".parse::<MemberPhase>().unwrap(), MemberPhase::CleanOut);
        assert!("Exploded".parse::<MemberPhase>().is_err());
    }
}
