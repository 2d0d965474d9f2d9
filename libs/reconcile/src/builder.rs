//! Boundary to plan generation.
//!
//! Deciding which records to enqueue is not the executor's job. A
//! [`PlanBuilder`] is consulted for every plan that is empty once the tick's
//! execution pass is over; its backoff proposals are merged into status
//! whether or not it proposed any records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_plan::{ActionRecord, BackOff, Deployment, PlanKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanProposal {
    /// Records for the plan, in execution order.
    pub actions: Vec<ActionRecord>,

    /// Backoff entries to combine into status.
    pub backoff: BackOff,
}

impl PlanProposal {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait PlanBuilder: Send + Sync {
    async fn propose(
        &self,
        deployment: &Deployment,
        kind: PlanKind,
        now: DateTime<Utc>,
    ) -> PlanProposal;
}

/// Proposes nothing; plans come from elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlanBuilder;

#[async_trait]
impl PlanBuilder for NoopPlanBuilder {
    async fn propose(
        &self,
        _deployment: &Deployment,
        _kind: PlanKind,
        _now: DateTime<Utc>,
    ) -> PlanProposal {
        PlanProposal::empty()
    }
}
