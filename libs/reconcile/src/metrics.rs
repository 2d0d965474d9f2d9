//! In-process action counters.
//!
//! Counters are labeled by deployment, action type and plan kind; the
//! gauge tracks which action is currently in flight on each plan.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use keel_events::Outcome;
use keel_plan::{ActionType, PlanKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionMetricKey {
    pub deployment: String,
    pub action_type: ActionType,
    pub plan: PlanKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounters {
    pub generated: u64,
    pub succeeded: u64,
    pub aborted: u64,
    pub timed_out: u64,
    pub start_failed: u64,
}

impl ActionCounters {
    /// Records removed as failures.
    pub fn failed(&self) -> u64 {
        self.aborted + self.timed_out
    }

    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Aborted => self.aborted += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::StartFailed => self.start_failed += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActionMetrics {
    counters: Mutex<BTreeMap<ActionMetricKey, ActionCounters>>,
    current: Mutex<BTreeMap<(String, PlanKind), ActionType>>,
}

impl ActionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, BTreeMap<ActionMetricKey, ActionCounters>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(deployment: &str, action_type: ActionType, plan: PlanKind) -> ActionMetricKey {
        ActionMetricKey {
            deployment: deployment.to_string(),
            action_type,
            plan,
        }
    }

    pub fn record_generated(&self, deployment: &str, action_type: ActionType, plan: PlanKind) {
        self.counters()
            .entry(Self::key(deployment, action_type, plan))
            .or_default()
            .generated += 1;
    }

    pub fn record_outcome(
        &self,
        deployment: &str,
        action_type: ActionType,
        plan: PlanKind,
        outcome: Outcome,
    ) {
        self.counters()
            .entry(Self::key(deployment, action_type, plan))
            .or_default()
            .count(outcome);
    }

    /// Sets (or clears) the in-flight action of a plan.
    pub fn set_current(&self, deployment: &str, plan: PlanKind, action: Option<ActionType>) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (deployment.to_string(), plan);
        match action {
            Some(action_type) => {
                current.insert(key, action_type);
            }
            None => {
                current.remove(&key);
            }
        }
    }

    pub fn current(&self, deployment: &str, plan: PlanKind) -> Option<ActionType> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(deployment.to_string(), plan))
            .copied()
    }

    pub fn get(&self, deployment: &str, action_type: ActionType, plan: PlanKind) -> ActionCounters {
        self.counters()
            .get(&Self::key(deployment, action_type, plan))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of one outcome over all deployments and plans.
    pub fn total(&self, action_type: ActionType, outcome: Outcome) -> u64 {
        self.counters()
            .iter()
            .filter(|(k, _)| k.action_type == action_type)
            .map(|(_, c)| match outcome {
                Outcome::Succeeded => c.succeeded,
                Outcome::Aborted => c.aborted,
                Outcome::TimedOut => c.timed_out,
                Outcome::StartFailed => c.start_failed,
            })
            .sum()
    }

    pub fn snapshot(&self) -> Vec<(ActionMetricKey, ActionCounters)> {
        self.counters()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
