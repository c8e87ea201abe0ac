use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::schedule::error::TaskError;
use crate::utils::http::HttpResponse;

impl TaskError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::NotFound(_) | TaskError::ArtifactNotFound { .. } => StatusCode::NOT_FOUND,
            TaskError::InvalidState(_) | TaskError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            TaskError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TaskError::Inference(_) | TaskError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(HttpResponse::error(self.to_string()))).into_response()
    }
}
