use axum::{extract::DefaultBodyLimit, middleware, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
pub mod handlers;

#[cfg(test)]
mod tests;

use crate::auth::require_token;
use crate::AppContext;

// room for the multipart framing around a maximum size file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(ctx: Arc<AppContext>) -> Router {
    let api = handlers::api_router(ctx.clone())
        .nest_service("/image", ServeDir::new(ctx.artifacts.root()))
        .layer(middleware::from_fn_with_state(
            ctx.token.clone(),
            require_token,
        ))
        .layer(DefaultBodyLimit::max(
            ctx.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ));

    Router::new()
        .merge(api)
        .merge(handlers::health_router(ctx))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<F>(listener: TcpListener, ctx: Arc<AppContext>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn start_server<F>(ctx: Arc<AppContext>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, ctx, shutdown).await
}
