use axum::{
    extract::{rejection::JsonRejection, Json, Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{checked_id, Md5Request};
use crate::schedule::error::TaskResult;
use crate::schedule::relama::resubmit_from_output;
use crate::schedule::types::TaskView;
use crate::schedule::Pagination;
use crate::utils::http::HttpResponse;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct Submitted {
    pub task_id: String,
}

// POST /lama
pub async fn submit(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<Md5Request>, JsonRejection>,
) -> TaskResult<Json<HttpResponse<Submitted>>> {
    let id = Md5Request::task_id(body)?;
    ctx.registry.submit(&id).await?;
    Ok(Json(HttpResponse::success(
        "task queued",
        Submitted { task_id: id },
    )))
}

/// Query parameters stay strings so malformed paging falls back to defaults
/// instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub md5: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl TasksQuery {
    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        let parse = |raw: &Option<String>, default: usize| {
            raw.as_deref()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        Pagination::new(
            parse(&self.page, defaults.page),
            parse(&self.per_page, defaults.per_page),
        )
    }
}

// GET /tasks?md5=  or  GET /tasks?page=&per_page=
pub async fn query(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<TasksQuery>,
) -> TaskResult<Response> {
    if query.md5.is_some() {
        let id = checked_id(query.md5)?;
        let task = ctx.registry.status(&id).await?;
        return Ok(Json(TaskView { md5: id, task }).into_response());
    }
    let page = ctx.registry.list(&query.pagination()).await;
    Ok(Json(page).into_response())
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted_files: Vec<String>,
}

// POST /delete_task
pub async fn delete(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<Md5Request>, JsonRejection>,
) -> TaskResult<Json<HttpResponse<Deleted>>> {
    let id = Md5Request::task_id(body)?;
    let files = ctx.registry.delete(&id).await?;
    let deleted_files = ctx.artifacts.remove_files(&files).await;
    info!("Deleted task {} and files {:?}", id, deleted_files);
    Ok(Json(HttpResponse::success(
        "task deleted",
        Deleted { deleted_files },
    )))
}

#[derive(Debug, Serialize)]
pub struct Resubmitted {
    pub new_md5: String,
}

// POST /relama
pub async fn relama(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<Md5Request>, JsonRejection>,
) -> TaskResult<Json<HttpResponse<Resubmitted>>> {
    let id = Md5Request::task_id(body)?;
    let new_md5 = resubmit_from_output(&ctx.registry, &ctx.artifacts, &id).await?;
    Ok(Json(HttpResponse::success(
        "task resubmitted",
        Resubmitted { new_md5 },
    )))
}
