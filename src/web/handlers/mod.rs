use axum::{
    extract::{rejection::JsonRejection, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::schedule::error::{TaskError, TaskResult};
use crate::utils::hash::is_valid_task_id;
use crate::AppContext;

pub mod health;
pub mod tasks;
pub mod upload;

/// Routes that need an access token when one is configured.
pub fn api_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/upload", post(upload::upload))
        .route("/lama", post(tasks::submit))
        .route("/tasks", get(tasks::query))
        .route("/delete_task", post(tasks::delete))
        .route("/relama", post(tasks::relama))
        .with_state(ctx)
}

pub fn health_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .with_state(ctx)
}

/// `{"md5": "..."}` body shared by the task endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Md5Request {
    #[serde(default)]
    pub md5: Option<String>,
}

impl Md5Request {
    /// Unwraps the extractor result and validates the id.
    pub fn task_id(body: Result<Json<Md5Request>, JsonRejection>) -> TaskResult<String> {
        let Json(body) = body.map_err(|e| TaskError::Validation(e.body_text()))?;
        checked_id(body.md5)
    }
}

pub fn checked_id(md5: Option<String>) -> TaskResult<String> {
    let id = md5
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TaskError::Validation("missing md5 parameter".to_string()))?;
    if !is_valid_task_id(&id) {
        return Err(TaskError::Validation(format!("invalid md5: {}", id)));
    }
    Ok(id)
}
