use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};

use crate::schedule::error::{TaskError, TaskResult};
use crate::schedule::pagination::Pagination;
use crate::schedule::types::{unix_now, Task, TaskPage, TaskStatus};
use crate::storage::artifact::ArtifactStore;
use crate::storage::task::TaskStore;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of records kept. Oldest `create_time` is evicted first,
    /// whatever its status.
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Single source of truth for task state.
///
/// Every operation runs under one exclusive lock. Mutations are staged on a
/// copy of the map and only swapped in after the store accepted the write, so
/// a failed write leaves memory and disk in agreement.
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    artifacts: Arc<ArtifactStore>,
    tasks: Mutex<IndexMap<String, Task>>,
    config: RegistryConfig,
    submitted: Notify,
}

impl TaskRegistry {
    pub async fn open(
        store: Arc<dyn TaskStore>,
        artifacts: Arc<ArtifactStore>,
        config: RegistryConfig,
    ) -> anyhow::Result<Self> {
        let tasks = store.load().await?;
        info!(
            "Task registry opened with {} tasks (capacity {})",
            tasks.len(),
            config.capacity
        );
        Ok(Self {
            store,
            artifacts,
            tasks: Mutex::new(tasks),
            config,
            submitted: Notify::new(),
        })
    }

    /// Signalled on every successful submit.
    pub fn submitted(&self) -> &Notify {
        &self.submitted
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    async fn commit(
        &self,
        tasks: &mut MutexGuard<'_, IndexMap<String, Task>>,
        staged: IndexMap<String, Task>,
    ) -> TaskResult<()> {
        self.store
            .save(&staged)
            .await
            .map_err(TaskError::Persistence)?;
        **tasks = staged;
        Ok(())
    }

    /// Creates a fresh pending record, discarding any previous record with the
    /// same id, then enforces capacity.
    pub async fn submit(&self, id: &str) -> TaskResult<Task> {
        let mut tasks = self.tasks.lock().await;
        let mut staged = tasks.clone();

        if staged.shift_remove(id).is_some() {
            info!("Replacing existing task: {}", id);
        }
        let task = Task::queued();
        staged.insert(id.to_string(), task.clone());

        for evicted in evict_oldest(&mut staged, self.config.capacity) {
            warn!("Registry over capacity, evicted oldest task: {}", evicted);
        }

        self.commit(&mut tasks, staged).await?;
        drop(tasks);

        info!("Task submitted: {}", id);
        self.submitted.notify_one();
        Ok(task)
    }

    pub async fn status(&self, id: &str) -> TaskResult<Task> {
        self.tasks
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// All tasks, newest `create_time` first, sliced by page.
    pub async fn list(&self, pagination: &Pagination) -> TaskPage {
        let pagination = pagination.check();
        let tasks = self.tasks.lock().await;

        let mut ordered: Vec<(&String, &Task)> = tasks.iter().collect();
        ordered.sort_by(|a, b| b.1.create_time.total_cmp(&a.1.create_time));

        let total = ordered.len();
        let page: IndexMap<String, Task> = ordered
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit())
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect();

        TaskPage {
            tasks: page,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: pagination.total_pages(total),
        }
    }

    /// Applies a status transition. Returns `Ok(false)` when `id` is unknown.
    pub async fn update(
        &self,
        id: &str,
        status: TaskStatus,
        message: &str,
        progress: Option<u8>,
    ) -> TaskResult<bool> {
        let mut tasks = self.tasks.lock().await;
        self.update_locked(&mut tasks, id, None, status, message, progress)
            .await
    }

    /// Like [`update`](Self::update), but only applies to the run created at
    /// `create_time`. Returns `Ok(false)` if the task was resubmitted or
    /// removed since.
    pub async fn update_run(
        &self,
        id: &str,
        create_time: f64,
        status: TaskStatus,
        message: &str,
        progress: Option<u8>,
    ) -> TaskResult<bool> {
        let mut tasks = self.tasks.lock().await;
        self.update_locked(&mut tasks, id, Some(create_time), status, message, progress)
            .await
    }

    async fn update_locked(
        &self,
        tasks: &mut MutexGuard<'_, IndexMap<String, Task>>,
        id: &str,
        run: Option<f64>,
        status: TaskStatus,
        message: &str,
        progress: Option<u8>,
    ) -> TaskResult<bool> {
        let Some(current) = tasks.get(id) else {
            debug!("Ignoring update for unknown task {}", id);
            return Ok(false);
        };
        if run.is_some_and(|t| t != current.create_time) {
            debug!("Ignoring update for superseded run of task {}", id);
            return Ok(false);
        }
        if !current.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        let mut staged = (**tasks).clone();
        if let Some(task) = staged.get_mut(id) {
            apply_update(task, status, message, progress);
        }
        self.commit(tasks, staged).await?;
        Ok(true)
    }

    /// Moves `id` from pending to processing in one step and returns the
    /// claimed record. `None` if the task disappeared or was already picked up.
    pub async fn claim(&self, id: &str) -> TaskResult<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get(id) {
            Some(task) if task.status == TaskStatus::Pending => {}
            _ => return Ok(None),
        }
        self.update_locked(&mut tasks, id, None, TaskStatus::Processing, "started", Some(0))
            .await?;
        Ok(tasks.get(id).cloned())
    }

    /// First pending task in insertion order. Does not claim it.
    pub async fn next_pending(&self) -> Option<String> {
        self.tasks
            .lock()
            .await
            .iter()
            .find(|(_, task)| task.status == TaskStatus::Pending)
            .map(|(id, _)| id.clone())
    }

    /// Removes a task that is not processing and returns its artifact files
    /// still on disk, for the caller to clean up.
    pub async fn delete(&self, id: &str) -> TaskResult<Vec<PathBuf>> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get(id) {
            None => return Err(TaskError::NotFound(id.to_string())),
            Some(task) if task.status == TaskStatus::Processing => {
                return Err(TaskError::InvalidState(id.to_string()));
            }
            Some(_) => {}
        }

        let mut staged = (*tasks).clone();
        staged.shift_remove(id);
        self.commit(&mut tasks, staged).await?;

        let files = self.artifacts.existing_files(id).await;
        info!("Task deleted: {} ({} artifact files)", id, files.len());
        Ok(files)
    }
}

fn apply_update(task: &mut Task, status: TaskStatus, message: &str, progress: Option<u8>) {
    let now = unix_now();
    task.status = status;
    task.message = message.to_string();

    if let Some(progress) = progress {
        task.progress = task.progress.max(progress.min(100));
    }
    if status == TaskStatus::Processing && task.start_time.is_none() {
        task.start_time = Some(now);
    }
    if status.is_terminal() {
        task.end_time = Some(now);
    }
}

/// Evicts records with the smallest `create_time` until `tasks` fits in
/// `capacity`. Ties go to the earliest inserted record.
fn evict_oldest(tasks: &mut IndexMap<String, Task>, capacity: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while tasks.len() > capacity {
        let oldest = tasks
            .values()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (idx, task)| match best {
                Some((_, t)) if t <= task.create_time => best,
                _ => Some((idx, task.create_time)),
            });
        match oldest.and_then(|(idx, _)| tasks.shift_remove_index(idx)) {
            Some((id, _)) => evicted.push(id),
            None => break,
        }
    }
    evicted
}
