//! Versioned deployment status storage.
//!
//! The status is the only shared mutable state. Writers read a versioned
//! copy, change it, and write it back conditionally on the version they
//! read; a mismatch is a [`StoreError::Conflict`] and the writer starts over.

use std::collections::BTreeMap;

use async_trait::async_trait;
use keel_plan::{Deployment, DeploymentStatus};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("deployment already exists: {0}")]
    AlreadyExists(String),

    /// Another writer changed the deployment since it was read.
    #[error("version conflict on {name}: expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Errors worth retrying on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Io(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A value with the store version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Names of all stored deployments.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, name: &str) -> Result<Versioned<Deployment>, StoreError>;

    /// Replaces the status if the stored version still equals
    /// `expected_version`. Returns the new version.
    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: DeploymentStatus,
    ) -> Result<u64, StoreError>;
}

/// In-process store, used by tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    deployments: RwLock<BTreeMap<String, Versioned<Deployment>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deployment at version 1.
    pub async fn insert(&self, deployment: Deployment) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write().await;
        if deployments.contains_key(&deployment.name) {
            return Err(StoreError::AlreadyExists(deployment.name));
        }
        deployments.insert(
            deployment.name.clone(),
            Versioned {
                version: 1,
                value: deployment,
            },
        );
        Ok(())
    }

    /// Changes a deployment outside the conditional-write path, bumping its
    /// version the way a concurrent writer would.
    pub async fn modify(
        &self,
        name: &str,
        f: impl FnOnce(&mut Deployment),
    ) -> Result<u64, StoreError> {
        let mut deployments = self.deployments.write().await;
        let entry = deployments
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        f(&mut entry.value);
        entry.version += 1;
        Ok(entry.version)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.deployments.read().await.keys().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Versioned<Deployment>, StoreError> {
        self.deployments
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: DeploymentStatus,
    ) -> Result<u64, StoreError> {
        let mut deployments = self.deployments.write().await;
        let entry = deployments
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if entry.version != expected_version {
            return Err(StoreError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.value.status = status;
        entry.version += 1;
        Ok(entry.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_plan::{MemberStatus, ServerGroup};

    #[tokio::test]
    async fn test_conditional_update() {
        let store = MemoryStatusStore::new();
        store.insert(Deployment::new("db")).await.unwrap();

        let read = store.get("db").await.unwrap();
        assert_eq!(read.version, 1);

        let mut status = read.value.status.clone();
        status.members.push(MemberStatus::new("a", ServerGroup::Agents));
        let v2 = store.update_status("db", read.version, status).await.unwrap();
        assert_eq!(v2, 2);

        let err = store
            .update_status("db", read.version, DeploymentStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }));
        assert_eq!(store.get("db").await.unwrap().value.status.members.len(), 1);
    }

    #[tokio::test]
    async fn test_modify_bumps_version() {
        let store = MemoryStatusStore::new();
        store.insert(Deployment::new("db")).await.unwrap();
        let v = store
            .modify("db", |d| d.spec.maintenance_aware_resign = false)
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert!(store.insert(Deployment::new("db")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_deployment() {
        let store = MemoryStatusStore::new();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
    }
}
