pub mod error;
pub mod pagination;
pub mod processors;
pub mod relama;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{TaskError, TaskResult};
pub use pagination::Pagination;
pub use types::{Task, TaskPage, TaskStatus, TaskView};

pub use processors::{InpaintProcessor, TaskProcessor, TaskRun};
pub use relama::resubmit_from_output;
pub use scheduler::{RegistryConfig, TaskRegistry, TaskScheduler, WorkerConfig};

use std::sync::Arc;

use crate::inpaint::ModelSlot;
use crate::storage::artifact::ArtifactStore;

/// Wires the inpainting processor to a scheduler over `registry`.
pub fn create_scheduler(
    registry: Arc<TaskRegistry>,
    artifacts: Arc<ArtifactStore>,
    model: Arc<ModelSlot>,
    config: WorkerConfig,
) -> TaskScheduler {
    let processor = Arc::new(InpaintProcessor::new(artifacts));
    TaskScheduler::new(registry, model, processor, config)
}
