use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::RwLock;

use super::TaskStore;
use crate::schedule::types::Task;

/// Non-durable store for tests and throwaway deployments.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<IndexMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IndexMap<String, Task> {
        self.tasks.read().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn load(&self) -> Result<IndexMap<String, Task>> {
        let tasks = self.tasks.read().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(tasks.clone())
    }

    async fn save(&self, tasks: &IndexMap<String, Task>) -> Result<()> {
        let mut stored = self.tasks.write().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        *stored = tasks.clone();
        Ok(())
    }
}
