use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use super::TaskRegistry;
use crate::inpaint::ModelSlot;
use crate::schedule::error::TaskError;
use crate::schedule::processors::{TaskProcessor, TaskRun};

const RETRY_INITIAL: Duration = Duration::from_millis(50);
const RETRY_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // how long to idle when there is nothing pending, e.g. 1 second
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// The single dispatcher loop. At most one task is processing at a time.
pub struct TaskWorker {
    registry: Arc<TaskRegistry>,
    model: Arc<ModelSlot>,
    processor: Arc<dyn TaskProcessor>,
    config: WorkerConfig,
}

impl TaskWorker {
    pub fn new(
        registry: Arc<TaskRegistry>,
        model: Arc<ModelSlot>,
        processor: Arc<dyn TaskProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            model,
            processor,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Task worker started (poll interval {:?})",
            self.config.poll_interval
        );
        while !*shutdown.borrow() {
            let busy = self.process_next_task(&shutdown).await;
            if busy {
                continue;
            }
            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                _ = self.registry.submitted().notified() => {}
                changed = shutdown.changed() => {
                    // sender gone means the scheduler was dropped
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Task worker stopped");
    }

    /// Returns true if a task was picked up, so the loop goes again without
    /// idling.
    async fn process_next_task(&self, shutdown: &watch::Receiver<bool>) -> bool {
        let model = match self.model.ensure().await {
            Ok(model) => model,
            Err(e) => {
                warn!("Model not ready, retrying next iteration: {}", e);
                return false;
            }
        };

        let Some(id) = self.registry.next_pending().await else {
            return false;
        };

        let claimed = match self.registry.claim(&id).await {
            Ok(Some(task)) => task,
            Ok(None) => return true,
            Err(e) => {
                error!("Failed to claim task {}: {}", id, e);
                return false;
            }
        };

        info!("Processing task: {}", id);
        let run = TaskRun::new(id.clone(), claimed.create_time, self.registry.clone());
        let failure = match self.processor.process(&run, model).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to process task {}: {:#}", id, e);
                Some(format!("processing failed: {:#}", e))
            }
        };
        self.record_outcome(&run, failure.as_deref(), shutdown).await;
        true
    }

    /// Writes the terminal status of `run`. Persistence failures are retried
    /// with backoff until the write lands, the run is superseded, or the
    /// worker is told to stop.
    async fn record_outcome(
        &self,
        run: &TaskRun,
        failure: Option<&str>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut shutdown = shutdown.clone();
        let mut backoff = RETRY_INITIAL;
        loop {
            let result = match failure {
                None => run.complete().await,
                Some(message) => run.fail(message).await,
            };
            match result {
                Ok(true) => {
                    info!("Task {} finished", run.id);
                    return;
                }
                Ok(false) => {
                    warn!("Task {} was superseded while processing", run.id);
                    return;
                }
                Err(TaskError::Persistence(e)) => {
                    warn!(
                        "Failed to record outcome of task {}, retrying in {:?}: {:#}",
                        run.id, backoff, e
                    );
                }
                Err(e) => {
                    error!("Failed to record outcome of task {}: {}", run.id, e);
                    return;
                }
            }

            if *shutdown.borrow() {
                error!("Shutting down, outcome of task {} left unrecorded", run.id);
                return;
            }
            tokio::select! {
                _ = sleep(backoff) => {}
                _ = shutdown.changed() => {
                    error!("Shutting down, outcome of task {} left unrecorded", run.id);
                    return;
                }
            }
            backoff = (backoff * 2).min(RETRY_MAX);
        }
    }
}
