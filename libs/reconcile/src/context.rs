//! Capabilities handed to an action for one call.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_plan::{ActionRecord, DeploymentSpec, MemberStatus};

use crate::{ActionError, ClusterClient, ClusterError, ScratchStore};

/// Everything an action may touch while it runs.
///
/// Member changes land in the tick's working copy of the status and are
/// committed together with the plan, so an action's bookkeeping and the
/// executor's plan update succeed or fail as one write.
pub struct ActionContext<'a> {
    deployment: &'a str,
    spec: &'a DeploymentSpec,
    members: &'a mut Vec<MemberStatus>,
    record: &'a mut ActionRecord,
    cluster: &'a dyn ClusterClient,
    notices: &'a mut Vec<String>,
    call_timeout: Duration,
    now: DateTime<Utc>,
}

impl<'a> ActionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deployment: &'a str,
        spec: &'a DeploymentSpec,
        members: &'a mut Vec<MemberStatus>,
        record: &'a mut ActionRecord,
        cluster: &'a dyn ClusterClient,
        notices: &'a mut Vec<String>,
        call_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            deployment,
            spec,
            members,
            record,
            cluster,
            notices,
            call_timeout,
            now,
        }
    }

    pub fn deployment(&self) -> &str {
        self.deployment
    }

    pub fn spec(&self) -> &DeploymentSpec {
        self.spec
    }

    /// Time the current tick started.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn record(&self) -> &ActionRecord {
        self.record
    }

    /// Time since the record was started, if it was.
    pub fn elapsed_since_start(&self) -> Option<Duration> {
        self.record
            .start_time
            .and_then(|started| (self.now - started).to_std().ok())
    }

    pub fn member(&self, id: &str) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn members(&self) -> &[MemberStatus] {
        self.members
    }

    /// Applies `f` to a member. Returns false if the member does not exist.
    pub fn update_member(&mut self, id: &str, f: impl FnOnce(&mut MemberStatus)) -> bool {
        match self.members.iter_mut().find(|m| m.id == id) {
            Some(member) => {
                f(member);
                true
            }
            None => false,
        }
    }

    pub fn remove_member(&mut self, id: &str) -> Option<MemberStatus> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }

    pub fn scratch(&mut self) -> ScratchStore<'_> {
        ScratchStore::new(&mut self.record.locals)
    }

    pub fn cluster(&self) -> &'a dyn ClusterClient {
        self.cluster
    }

    /// Runs one external call under the per-call timeout.
    pub async fn call<T, F>(&self, fut: F) -> Result<T, ActionError>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(ActionError::from),
            Err(_) => Err(ActionError::CallTimeout(self.call_timeout)),
        }
    }

    /// Emits an action-defined notice; published with the tick's events.
    pub fn notice(&mut self, message: impl Into<String>) {
        self.notices.push(message.into());
    }
}
