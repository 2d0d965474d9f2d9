//! The managed resource: a database deployment.

use serde::{Deserialize, Serialize};

use crate::{ActionTimeouts, BackOff, MemberStatus, Plan, PlanKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeploymentMode {
    Single,
    ActiveFailover,
    #[default]
    Cluster,
}

/// Desired configuration relevant to plan execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default)]
    pub mode: DeploymentMode,
    #[serde(default)]
    pub timeouts: ActionTimeouts,
    /// Skip leadership resignation while the cluster is in maintenance mode.
    #[serde(default = "default_true")]
    pub maintenance_aware_resign: bool,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            timeouts: ActionTimeouts::default(),
            maintenance_aware_resign: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Observed state plus the work queued against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub high_priority_plan: Plan,
    #[serde(default)]
    pub backoff: BackOff,
    #[serde(default)]
    pub members: Vec<MemberStatus>,
}

impl DeploymentStatus {
    pub fn plan(&self, kind: PlanKind) -> &Plan {
        match kind {
            PlanKind::High => &self.high_priority_plan,
            PlanKind::Normal => &self.plan,
        }
    }

    pub fn plan_mut(&mut self, kind: PlanKind) -> &mut Plan {
        match kind {
            PlanKind::High => &mut self.high_priority_plan,
            PlanKind::Normal => &mut self.plan,
        }
    }

    pub fn member(&self, id: &str) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_mut(&mut self, id: &str) -> Option<&mut MemberStatus> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Removes a member, returning it if present.
    pub fn remove_member(&mut self, id: &str) -> Option<MemberStatus> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: DeploymentSpec::default(),
            status: DeploymentStatus::default(),
        }
    }
}
