mod registry;
mod worker;

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::inpaint::ModelSlot;
use crate::schedule::processors::TaskProcessor;

pub use registry::{RegistryConfig, TaskRegistry};
pub use worker::{TaskWorker, WorkerConfig};

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the lifetime of the single dispatcher worker.
pub struct TaskScheduler {
    registry: Arc<TaskRegistry>,
    model: Arc<ModelSlot>,
    processor: Arc<dyn TaskProcessor>,
    config: WorkerConfig,
    running: Mutex<Option<Running>>,
}

impl TaskScheduler {
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
            running: Mutex::new(None),
        }
    }

    /// Spawns the worker. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (shutdown, rx) = watch::channel(false);
        let worker = TaskWorker::new(
            self.registry.clone(),
            self.model.clone(),
            self.processor.clone(),
            self.config.clone(),
        );
        let handle = tokio::spawn(async move {
            worker.run(rx).await;
        });
        *running = Some(Running { shutdown, handle });
        info!("Task scheduler started");
    }

    /// Signals the worker and waits for it to exit. A task in flight is
    /// finished first.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!("Task worker exited abnormally: {}", e);
        }
        info!("Task scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
