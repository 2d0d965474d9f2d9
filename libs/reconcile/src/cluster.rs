//! Boundary to the managed database cluster.

use async_trait::async_trait;
use keel_plan::MemberStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The cluster could not be reached or did not answer.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    /// The cluster answered with an error.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("operation not supported by this client: {0}")]
    Unsupported(&'static str),
}

/// State of an agency job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued, not yet picked up.
    Pending,
    Running,
    Finished,
    Failed(String),
    /// The agency has no record of the job.
    NotFound,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_) | Self::NotFound)
    }
}

/// Operations actions perform against the database cluster.
///
/// Every method defaults to [`ClusterError::Unsupported`] so that partial
/// clients (and test doubles) only implement what they need.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submits a job moving all shards off `member_id`. Returns the job id.
    async fn clean_out_server(&self, _member_id: &str) -> Result<String, ClusterError> {
        Err(ClusterError::Unsupported("clean_out_server"))
    }

    /// True once the cluster lists `member_id` as cleaned out.
    async fn is_cleaned_out(&self, _member_id: &str) -> Result<bool, ClusterError> {
        Err(ClusterError::Unsupported("is_cleaned_out"))
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus, ClusterError> {
        Err(ClusterError::Unsupported("job_status"))
    }

    /// Submits a job handing over all shard leadership of `member_id`.
    async fn resign_leadership(&self, _member_id: &str) -> Result<String, ClusterError> {
        Err(ClusterError::Unsupported("resign_leadership"))
    }

    /// True if `member_id` currently leads at least one shard.
    async fn leads_shards(&self, _member_id: &str) -> Result<bool, ClusterError> {
        Err(ClusterError::Unsupported("leads_shards"))
    }

    async fn maintenance_mode(&self) -> Result<bool, ClusterError> {
        Err(ClusterError::Unsupported("maintenance_mode"))
    }

    async fn set_maintenance_mode(&self, _enabled: bool) -> Result<(), ClusterError> {
        Err(ClusterError::Unsupported("set_maintenance_mode"))
    }

    /// True if the cluster health reports the member as good.
    async fn is_server_up(&self, _member_id: &str) -> Result<bool, ClusterError> {
        Err(ClusterError::Unsupported("is_server_up"))
    }

    async fn shutdown_server(&self, _member: &MemberStatus) -> Result<(), ClusterError> {
        Err(ClusterError::Unsupported("shutdown_server"))
    }

    /// Removes `member_id` from the cluster's server list.
    async fn remove_server(&self, _member_id: &str) -> Result<(), ClusterError> {
        Err(ClusterError::Unsupported("remove_server"))
    }
}
