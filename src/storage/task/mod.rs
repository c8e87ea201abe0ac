use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;

use crate::schedule::types::Task;

pub mod json;
pub mod memory;

pub use json::JsonFileTaskStore;
pub use memory::InMemoryTaskStore;

/// Durable backing for the task registry. The registry keeps the working copy
/// in memory and hands the full map to `save` after every mutation.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Loads every persisted task in insertion order. A missing or unreadable
    /// store yields an empty map rather than an error.
    async fn load(&self) -> Result<IndexMap<String, Task>>;

    /// Replaces the persisted state with `tasks`. Must be atomic: a crash
    /// mid-write leaves either the old or the new state, never a mix.
    async fn save(&self, tasks: &IndexMap<String, Task>) -> Result<()>;
}
