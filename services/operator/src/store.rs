//! File-backed status store.
//!
//! One JSON document per deployment, `<state_dir>/<name>.json`, holding the
//! deployment and its version. Writes go to a temp file in the same
//! directory and are renamed over the document, so readers see either the
//! old or the new version.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keel_plan::{Deployment, DeploymentStatus};
use keel_reconcile::{StatusStore, StoreError, Versioned};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct StoredDeployment {
    version: u64,
    deployment: Deployment,
}

#[derive(Debug)]
pub struct FileStatusStore {
    dir: PathBuf,
    /// Serializes read-check-write cycles.
    write_lock: Mutex<()>,
}

impl FileStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Adds a deployment at version 1.
    pub async fn create(&self, deployment: Deployment) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(&deployment.name)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(deployment.name));
        }
        self.write(
            path,
            StoredDeployment {
                version: 1,
                deployment,
            },
        )
        .await
    }

    async fn read(&self, name: &str) -> Result<StoredDeployment, StoreError> {
        let path = self.path(name)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    async fn write(&self, path: PathBuf, stored: StoredDeployment) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&stored)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&content)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(
            deployment = %stored.deployment.name,
            version = stored.version,
            "Saved deployment status"
        );
        Ok(())
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Versioned<Deployment>, StoreError> {
        let stored = self.read(name).await?;
        Ok(Versioned {
            version: stored.version,
            value: stored.deployment,
        })
    }

    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: DeploymentStatus,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.read(name).await?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        stored.deployment.status = status;
        stored.version += 1;
        let version = stored.version;
        self.write(self.path(name)?, stored).await?;
        Ok(version)
    }
}
