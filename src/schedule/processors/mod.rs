pub mod inpaint;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::inpaint::InpaintModel;
use crate::schedule::error::{TaskError, TaskResult};
use crate::schedule::scheduler::TaskRegistry;
use crate::schedule::types::TaskStatus;

pub use inpaint::InpaintProcessor;

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Runs one claimed task to the point where its output is durable.
    /// Marking the task completed or failed is left to the caller.
    async fn process(&self, run: &TaskRun, model: Arc<dyn InpaintModel>) -> Result<()>;
}

/// One claimed execution of a task. Updates only land on the record that was
/// claimed; a resubmit under the same id starts a different run.
pub struct TaskRun {
    pub id: String,
    pub create_time: f64,
    registry: Arc<TaskRegistry>,
}

impl TaskRun {
    pub fn new(id: impl Into<String>, create_time: f64, registry: Arc<TaskRegistry>) -> Self {
        Self {
            id: id.into(),
            create_time,
            registry,
        }
    }

    /// Reports a processing milestone. Fails once the run has been superseded
    /// so the processor stops early. A milestone that cannot be persisted is
    /// skipped; the terminal update is retried by the worker.
    pub async fn progress(&self, progress: u8, message: &str) -> Result<()> {
        let applied = match self
            .registry
            .update_run(
                &self.id,
                self.create_time,
                TaskStatus::Processing,
                message,
                Some(progress),
            )
            .await
        {
            Ok(applied) => applied,
            Err(TaskError::Persistence(e)) => {
                warn!("Progress {} of task {} not persisted: {:#}", progress, self.id, e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if !applied {
            bail!("task {} was resubmitted or removed during processing", self.id);
        }
        Ok(())
    }

    pub async fn complete(&self) -> TaskResult<bool> {
        self.registry
            .update_run(
                &self.id,
                self.create_time,
                TaskStatus::Completed,
                "completed",
                Some(100),
            )
            .await
    }

    pub async fn fail(&self, message: &str) -> TaskResult<bool> {
        self.registry
            .update_run(&self.id, self.create_time, TaskStatus::Error, message, None)
            .await
    }
}
