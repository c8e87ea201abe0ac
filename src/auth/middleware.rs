use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::warn;

use super::{AccessToken, AuthError};
use crate::utils::http::HttpResponse;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Accepts the token as `?token=` (what the web client sends) or as
/// `Authorization: Bearer`.
pub async fn require_token(
    State(token): State<AccessToken>,
    Query(query): Query<TokenQuery>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let presented = query.token.as_deref().or(bearer);

    if let Err(e) = token.verify(presented) {
        warn!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
        return Err(e);
    }
    Ok(next.run(req).await)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(HttpResponse::error(self.to_string())),
        )
            .into_response()
    }
}
