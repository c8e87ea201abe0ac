use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{info, warn};

use super::TaskStore;
use crate::schedule::types::Task;
use crate::utils::fs::write_atomic;

/// Stores the whole registry as one pretty-printed JSON object
/// `{ id: { status, create_time, ... } }`.
pub struct JsonFileTaskStore {
    path: PathBuf,
}

impl JsonFileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Initializing JSON task storage at {}", path.display());
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn load(&self) -> Result<IndexMap<String, Task>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Task file {} not found, starting empty", self.path.display());
                return Ok(IndexMap::new());
            }
            Err(e) => {
                warn!("Failed to read task file {}: {}, starting empty", self.path.display(), e);
                return Ok(IndexMap::new());
            }
        };

        match serde_json::from_slice::<IndexMap<String, Task>>(&bytes) {
            Ok(tasks) => {
                info!("Loaded {} tasks from {}", tasks.len(), self.path.display());
                Ok(tasks)
            }
            Err(e) => {
                warn!("Task file {} is not valid: {}, starting empty", self.path.display(), e);
                Ok(IndexMap::new())
            }
        }
    }

    async fn save(&self, tasks: &IndexMap<String, Task>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(tasks).context("failed to serialize tasks")?;
        write_atomic(&self.path, bytes)
            .await
            .with_context(|| format!("failed to write task file {}", self.path.display()))
    }
}
