use crate::schedule::types::TaskStatus;
use crate::storage::artifact::ArtifactKind;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task {0} not found")]
    NotFound(String),

    #[error("{kind} not found for task {id}")]
    ArtifactNotFound { id: String, kind: ArtifactKind },

    #[error("task {0} is processing and cannot be deleted")]
    InvalidState(String),

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("inference model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
