//! Action timeouts.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActionRecord, ActionType};

/// Timeout for action types without a specific default.
pub const ACTIONS_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Per-type timeout overrides from the deployment spec, in seconds.
///
/// A value of zero disables the timeout for that type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTimeouts {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<ActionType, u64>,
}

impl ActionTimeouts {
    pub fn with_override(mut self, action_type: ActionType, timeout: Duration) -> Self {
        self.actions.insert(action_type, timeout.as_secs());
        self
    }

    /// Effective timeout for a type: the override if present, else the default.
    pub fn resolve(&self, action_type: ActionType) -> Duration {
        self.actions
            .get(&action_type)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| action_type.default_timeout())
    }
}

/// Reports whether a started record has run longer than `timeout`.
///
/// Never true for an unstarted record or a zero (infinite) timeout.
pub fn is_action_timeout(timeout: Duration, record: &ActionRecord, now: DateTime<Utc>) -> bool {
    let Some(started) = record.start_time else {
        return false;
    };
    if timeout.is_zero() {
        return false;
    }
    match (now - started).to_std() {
        Ok(elapsed) => elapsed > timeout,
        // start time in the future
        Err(_) => false,
    }
}
