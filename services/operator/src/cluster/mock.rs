//! In-memory cluster for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use keel_plan::MemberStatus;
use keel_reconcile::{ClusterClient, ClusterError, JobStatus};
use tracing::info;

#[derive(Debug, Default)]
struct MockState {
    next_job: u64,
    jobs: BTreeMap<String, JobStatus>,
    cleaned_out: BTreeSet<String>,
    leaders: BTreeSet<String>,
    up: BTreeSet<String>,
    removed: BTreeSet<String>,
    maintenance: bool,
    /// Operations answering `Unavailable` until healed.
    failing: BTreeSet<&'static str>,
    calls: Vec<String>,
}

/// Scripted cluster. Jobs stay pending until a test finishes or fails them.
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<MockState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a call and fails it if the operation is scripted to fail.
    fn enter(&self, op: &'static str, arg: &str) -> Result<MutexGuard<'_, MockState>, ClusterError> {
        let mut state = self.state();
        state.calls.push(format!("{op}:{arg}"));
        if state.failing.contains(op) {
            return Err(ClusterError::Unavailable(format!("mock {op} failing")));
        }
        Ok(state)
    }

    fn submit(state: &mut MockState, kind: &str) -> String {
        state.next_job += 1;
        let id = format!("{kind}-{}", state.next_job);
        state.jobs.insert(id.clone(), JobStatus::Pending);
        id
    }

    pub fn set_up(&self, member_id: &str, up: bool) {
        let mut state = self.state();
        if up {
            state.up.insert(member_id.to_string());
        } else {
            state.up.remove(member_id);
        }
    }

    pub fn set_leader(&self, member_id: &str, leads: bool) {
        let mut state = self.state();
        if leads {
            state.leaders.insert(member_id.to_string());
        } else {
            state.leaders.remove(member_id);
        }
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.state().maintenance = enabled;
    }

    pub fn mark_cleaned_out(&self, member_id: &str) {
        self.state().cleaned_out.insert(member_id.to_string());
    }

    pub fn set_job(&self, job_id: &str, status: JobStatus) {
        self.state().jobs.insert(job_id.to_string(), status);
    }

    pub fn fail_operation(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn heal_operation(&self, op: &'static str) {
        self.state().failing.remove(op);
    }

    pub fn jobs(&self) -> Vec<(String, JobStatus)> {
        self.state()
            .jobs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_removed(&self, member_id: &str) -> bool {
        self.state().removed.contains(member_id)
    }

    pub fn maintenance(&self) -> bool {
        self.state().maintenance
    }

    /// Calls made so far, as `operation:argument`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn clean_out_server(&self, member_id: &str) -> Result<String, ClusterError> {
        let mut state = self.enter("clean_out_server", member_id)?;
        let job_id = Self::submit(&mut state, "cleanout");
        info!(member_id, job_id = %job_id, "[MOCK] Cleanout submitted");
        Ok(job_id)
    }

    async fn is_cleaned_out(&self, member_id: &str) -> Result<bool, ClusterError> {
        let state = self.enter("is_cleaned_out", member_id)?;
        Ok(state.cleaned_out.contains(member_id))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ClusterError> {
        let state = self.enter("job_status", job_id)?;
        Ok(state.jobs.get(job_id).cloned().unwrap_or(JobStatus::NotFound))
    }

    async fn resign_leadership(&self, member_id: &str) -> Result<String, ClusterError> {
        let mut state = self.enter("resign_leadership", member_id)?;
        Ok(Self::submit(&mut state, "resign"))
    }

    async fn leads_shards(&self, member_id: &str) -> Result<bool, ClusterError> {
        let state = self.enter("leads_shards", member_id)?;
        Ok(state.leaders.contains(member_id))
    }

    async fn maintenance_mode(&self) -> Result<bool, ClusterError> {
        let state = self.enter("maintenance_mode", "")?;
        Ok(state.maintenance)
    }

    async fn set_maintenance_mode(&self, enabled: bool) -> Result<(), ClusterError> {
        let mut state = self.enter("set_maintenance_mode", if enabled { "on" } else { "off" })?;
        state.maintenance = enabled;
        Ok(())
    }

    async fn is_server_up(&self, member_id: &str) -> Result<bool, ClusterError> {
        let state = self.enter("is_server_up", member_id)?;
        Ok(state.up.contains(member_id))
    }

    async fn shutdown_server(&self, member: &MemberStatus) -> Result<(), ClusterError> {
        let mut state = self.enter("shutdown_server", &member.id)?;
        state.up.remove(&member.id);
        Ok(())
    }

    async fn remove_server(&self, member_id: &str) -> Result<(), ClusterError> {
        let mut state = self.enter("remove_server", member_id)?;
        if !state.removed.insert(member_id.to_string()) {
            return Err(ClusterError::NotFound(member_id.to_string()));
        }
        state.up.remove(member_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_stay_pending_until_scripted() {
        let cluster = MockCluster::new();
        let job = cluster.clean_out_server("PRMR-1").await.unwrap();
        assert_eq!(cluster.job_status(&job).await.unwrap(), JobStatus::Pending);

        cluster.set_job(&job, JobStatus::Finished);
        assert_eq!(cluster.job_status(&job).await.unwrap(), JobStatus::Finished);
        assert_eq!(cluster.job_status("nope").await.unwrap(), JobStatus::NotFound);
    }

    #[tokio::test]
    async fn test_failing_operation() {
        let cluster = MockCluster::new();
        cluster.fail_operation("is_server_up");
        assert!(matches!(
            cluster.is_server_up("a").await,
            Err(ClusterError::Unavailable(_))
        ));
        cluster.heal_operation("is_server_up");
        assert!(!cluster.is_server_up("a").await.unwrap());
        assert_eq!(cluster.call_count("is_server_up"), 2);
    }
}
