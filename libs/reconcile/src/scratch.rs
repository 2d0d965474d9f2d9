//! Per-record scratch storage.
//!
//! Actions that hand work to an asynchronous server-side job store the job
//! handle here before reporting "not ready", and re-attach to it on later
//! polls. The map lives in [`keel_plan::ActionRecord::locals`], separate
//! from the user-facing params, and disappears with the record.

use std::collections::BTreeMap;

/// Value marking a key whose job has concluded.
pub const SCRATCH_EMPTY: &str = "N/A";

/// Mutable view over one record's scratch map.
#[derive(Debug)]
pub struct ScratchStore<'r> {
    locals: &'r mut BTreeMap<String, String>,
}

impl<'r> ScratchStore<'r> {
    pub fn new(locals: &'r mut BTreeMap<String, String>) -> Self {
        Self { locals }
    }

    /// Returns the stored value; cleared keys read as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.locals
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && *v != SCRATCH_EMPTY)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.locals.insert(key.into(), value.into());
    }

    /// Marks a key as concluded so later polls do not re-attach to it.
    pub fn clear(&mut self, key: impl Into<String>) {
        self.locals.insert(key.into(), SCRATCH_EMPTY.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get_clear() {
        let mut locals = BTreeMap::new();
        let mut scratch = ScratchStore::new(&mut locals);
        assert_eq!(scratch.get("jobID"), None);

        scratch.add("jobID", "1234");
        assert_eq!(scratch.get("jobID"), Some("1234"));

        scratch.clear("jobID");
        assert!(!scratch.contains("jobID"));
        assert_eq!(locals.get("jobID").map(String::as_str), Some(SCRATCH_EMPTY));
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let mut locals = BTreeMap::from([("jobID".to_string(), String::new())]);
        let scratch = ScratchStore::new(&mut locals);
        assert_eq!(scratch.get("jobID"), None);
    }
}
