//! Cluster client over the database's admin REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use keel_plan::MemberStatus;
use keel_reconcile::{ClusterClient, ClusterError, JobStatus};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpClusterClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterClient {
    /// `timeout` bounds every request end to end.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClusterError> {
        let response = request.send().await.map_err(transport)?;
        self.handle_response(response).await
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ClusterError> {
        let response = request.send().await.map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(response).await
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClusterError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ClusterError::Decode(e.to_string()))
        } else {
            self.handle_error(response).await
        }
    }

    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, ClusterError> {
        let status = response.status();
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error_message)
            .unwrap_or_else(|_| status.to_string());

        debug!(status = status.as_u16(), message = %message, "Cluster request failed");
        Err(match status {
            StatusCode::NOT_FOUND => ClusterError::NotFound(message),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                ClusterError::Unavailable(message)
            }
            _ => ClusterError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn submit_job(&self, path: &str, member_id: &str) -> Result<String, ClusterError> {
        let job: JobRef = self
            .send(
                self.client
                    .post(self.url(path))
                    .json(&ServerRequest { server: member_id }),
            )
            .await?;
        Ok(job.id)
    }
}

fn transport(err: reqwest::Error) -> ClusterError {
    ClusterError::Unavailable(err.to_string())
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn clean_out_server(&self, member_id: &str) -> Result<String, ClusterError> {
        self.submit_job("/_admin/cluster/cleanOutServer", member_id).await
    }

    async fn is_cleaned_out(&self, member_id: &str) -> Result<bool, ClusterError> {
        let servers: NumberOfServers = self
            .send(self.client.get(self.url("/_admin/cluster/numberOfServers")))
            .await?;
        Ok(servers.cleaned_servers.iter().any(|s| s == member_id))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ClusterError> {
        let request = self
            .client
            .get(self.url("/_admin/cluster/queryAgencyJob"))
            .query(&[("id", job_id)]);
        match self.send::<AgencyJob>(request).await {
            Ok(job) => Ok(job.into_status()),
            Err(ClusterError::NotFound(_)) => Ok(JobStatus::NotFound),
            Err(err) => Err(err),
        }
    }

    async fn resign_leadership(&self, member_id: &str) -> Result<String, ClusterError> {
        self.submit_job("/_admin/cluster/resignLeadership", member_id).await
    }

    async fn leads_shards(&self, member_id: &str) -> Result<bool, ClusterError> {
        let distribution: ShardDistribution = self
            .send(self.client.get(self.url("/_admin/cluster/shardDistribution")))
            .await?;
        Ok(distribution
            .results
            .values()
            .flat_map(|collection| collection.plan.values())
            .any(|shard| shard.leader == member_id))
    }

    async fn maintenance_mode(&self) -> Result<bool, ClusterError> {
        let state: Maintenance = self
            .send(self.client.get(self.url("/_admin/cluster/maintenance")))
            .await?;
        Ok(state.result.as_deref() == Some("on"))
    }

    async fn set_maintenance_mode(&self, enabled: bool) -> Result<(), ClusterError> {
        let mode = if enabled { "on" } else { "off" };
        self.send_empty(
            self.client
                .put(self.url("/_admin/cluster/maintenance"))
                .json(&mode),
        )
        .await
    }

    async fn is_server_up(&self, member_id: &str) -> Result<bool, ClusterError> {
        let health: ClusterHealth = self
            .send(self.client.get(self.url("/_admin/cluster/health")))
            .await?;
        Ok(health
            .health
            .get(member_id)
            .is_some_and(|server| server.status == "GOOD"))
    }

    async fn shutdown_server(&self, member: &MemberStatus) -> Result<(), ClusterError> {
        let endpoint = member
            .endpoint
            .as_deref()
            .ok_or_else(|| ClusterError::NotFound(format!("endpoint of member {}", member.id)))?;
        let url = format!("{}/_admin/shutdown", endpoint.trim_end_matches('/'));
        self.send_empty(self.client.delete(url)).await
    }

    async fn remove_server(&self, member_id: &str) -> Result<(), ClusterError> {
        self.send_empty(
            self.client
                .post(self.url("/_admin/cluster/removeServer"))
                .json(&member_id),
        )
        .await
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct ServerRequest<'a> {
    server: &'a str,
}

#[derive(Debug, Deserialize)]
struct JobRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberOfServers {
    #[serde(default)]
    cleaned_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AgencyJob {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

impl AgencyJob {
    fn into_status(self) -> JobStatus {
        match self.status.as_str() {
            "ToDo" => JobStatus::Pending,
            "Pending" => JobStatus::Running,
            "Finished" => JobStatus::Finished,
            "Failed" => JobStatus::Failed(self.reason.unwrap_or_default()),
            _ => JobStatus::Running,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShardDistribution {
    #[serde(default)]
    results: BTreeMap<String, CollectionDistribution>,
}

#[derive(Debug, Deserialize)]
struct CollectionDistribution {
    #[serde(rename = "Plan", default)]
    plan: BTreeMap<String, ShardPlan>,
}

#[derive(Debug, Deserialize)]
struct ShardPlan {
    leader: String,
}

#[derive(Debug, Deserialize)]
struct Maintenance {
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    #[serde(rename = "Health", default)]
    health: BTreeMap<String, ServerHealth>,
}

#[derive(Debug, Deserialize)]
struct ServerHealth {
    #[serde(rename = "Status")]
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = HttpClusterClient::new("http://db:8529/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/_admin/cluster/health"),
            "http://db:8529/_admin/cluster/health"
        );
    }

    #[test]
    fn test_agency_job_states() {
        let job = |status: &str| AgencyJob {
            status: status.to_string(),
            reason: Some("boom".to_string()),
        };
        assert_eq!(job("ToDo").into_status(), JobStatus::Pending);
        assert_eq!(job("Pending").into_status(), JobStatus::Running);
        assert_eq!(job("Finished").into_status(), JobStatus::Finished);
        assert_eq!(job("Failed").into_status(), JobStatus::Failed("boom".to_string()));
    }
}
