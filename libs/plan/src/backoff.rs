//! Backoff state for plan generation.
//!
//! Backoff throttles how often a plan builder may schedule a new record
//! for the same (action type, member) pair. It has no effect on records
//! already in a plan.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ActionType;

// =============================================================================
// Policy
// =============================================================================

/// Exponential delay between scheduling attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,

    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(15 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackOffKey {
    pub action_type: ActionType,
    pub member_id: String,
}

impl BackOffKey {
    pub fn new(action_type: ActionType, member_id: impl Into<String>) -> Self {
        Self {
            action_type,
            member_id: member_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackOffState {
    /// Consecutive scheduling failures.
    pub count: u32,

    /// Earliest time a new record for the key may be scheduled.
    pub next_retry_at: DateTime<Utc>,
}

impl BackOffState {
    /// Componentwise maximum; the more restrictive of the two.
    fn restrictive(self, other: Self) -> Self {
        Self {
            count: self.count.max(other.count),
            next_retry_at: self.next_retry_at.max(other.next_retry_at),
        }
    }
}

/// Accumulated backoff, keyed by (action type, member).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<BackOffEntry>", into = "Vec<BackOffEntry>")]
pub struct BackOff(BTreeMap<BackOffKey, BackOffState>);

impl BackOff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &BackOffKey) -> Option<&BackOffState> {
        self.0.get(key)
    }

    /// Inserts a state, keeping the more restrictive one if the key exists.
    pub fn insert(&mut self, key: BackOffKey, state: BackOffState) {
        self.0
            .entry(key)
            .and_modify(|existing| *existing = existing.restrictive(state))
            .or_insert(state);
    }

    /// True if a new record for `key` may be scheduled at `now`.
    pub fn is_eligible(&self, key: &BackOffKey, now: DateTime<Utc>) -> bool {
        self.0.get(key).is_none_or(|state| now >= state.next_retry_at)
    }

    /// Records another failure for `key` and pushes its eligibility out.
    pub fn back_off(&mut self, key: BackOffKey, policy: &BackoffPolicy, now: DateTime<Utc>) {
        let count = self.0.get(&key).map_or(0, |s| s.count);
        let delay = chrono::Duration::from_std(policy.delay(count))
            .unwrap_or_else(|_| chrono::Duration::seconds(policy.max.as_secs() as i64));
        self.0.insert(
            key,
            BackOffState {
                count: count.saturating_add(1),
                next_retry_at: now + delay,
            },
        );
    }

    /// Forgets a key after the action finally succeeded.
    pub fn clear(&mut self, key: &BackOffKey) {
        self.0.remove(key);
    }

    /// Combines two proposals; overlapping keys keep the later time and the
    /// higher count.
    #[must_use]
    pub fn combine_latest(&self, other: &BackOff) -> BackOff {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// In-place form of [`BackOff::combine_latest`].
    pub fn merge(&mut self, other: &BackOff) {
        for (key, state) in &other.0 {
            self.insert(key.clone(), *state);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackOffKey, &BackOffState)> {
        self.0.iter()
    }
}

/// Persisted form of one backoff entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackOffEntry {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(default, rename = "memberID")]
    member_id: String,
    count: u32,
    next_retry_at: DateTime<Utc>,
}

impl From<Vec<BackOffEntry>> for BackOff {
    fn from(entries: Vec<BackOffEntry>) -> Self {
        let mut backoff = BackOff::new();
        for e in entries {
            backoff.insert(
                BackOffKey::new(e.action_type, e.member_id),
                BackOffState {
                    count: e.count,
                    next_retry_at: e.next_retry_at,
                },
            );
        }
        backoff
    }
}

impl From<BackOff> for Vec<BackOffEntry> {
    fn from(backoff: BackOff) -> Self {
        backoff
            .0
            .into_iter()
            .map(|(key, state)| BackOffEntry {
                action_type: key.action_type,
                member_id: key.member_id,
                count: state.count,
                next_retry_at: state.next_retry_at,
            })
            .collect()
    }
}
