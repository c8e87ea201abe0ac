use axum::extract::{Json, State};
use serde::Serialize;
use std::sync::Arc;

use crate::utils::http::HttpResponse;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct Health {
    pub model: String,
    pub tasks: usize,
}

// GET /health
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HttpResponse<Health>> {
    let health = Health {
        model: ctx.model.state().to_string(),
        tasks: ctx.registry.len().await,
    };
    Json(HttpResponse::success("ok", health))
}
