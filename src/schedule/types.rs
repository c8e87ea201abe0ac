use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Lifecycle of one inpainting job. Forward-only within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Error => 2,
        }
    }

    /// `processing -> processing` is allowed so the worker can report progress.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (TaskStatus::Processing, TaskStatus::Processing) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Persisted task record. The id is the key it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub status: TaskStatus,
    pub create_time: f64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub progress: u8,
    pub message: String,
}

impl Task {
    pub fn queued() -> Self {
        Self {
            status: TaskStatus::Pending,
            create_time: unix_now(),
            start_time: None,
            end_time: None,
            progress: 0,
            message: "queued".to_string(),
        }
    }
}

/// Unix seconds with microsecond precision.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A task record together with its id, as returned by point lookups.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub md5: String,
    #[serde(flatten)]
    pub task: Task,
}

/// One page of tasks, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: IndexMap<String, Task>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}
