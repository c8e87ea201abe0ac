#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use inpaint_rs::{
    auth::AccessToken,
    inpaint::{ModelLoader, ModelSlot},
    schedule::{create_scheduler, RegistryConfig, TaskRegistry, WorkerConfig},
    storage::{artifact::ArtifactStore, task::JsonFileTaskStore},
    utils::logger,
    AppContext,
};
use std::sync::Arc;
use tracing::{error, info};

#[cfg(feature = "onnx")]
fn model_loader() -> Arc<dyn ModelLoader> {
    Arc::new(inpaint_rs::inpaint::onnx::OnnxModelLoader::new(
        inpaint_rs::MODEL_PATH.as_str(),
    ))
}

#[cfg(not(feature = "onnx"))]
fn model_loader() -> Arc<dyn ModelLoader> {
    Arc::new(inpaint_rs::inpaint::UnavailableLoader)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    inpaint_rs::init_env();
    let _guard = logger::init(inpaint_rs::LOG_DIR.clone())?;

    info!(
        "Starting inpainting service ({})...",
        option_env!("GIT_HASH").unwrap_or("unknown")
    );

    info!("Initializing Storage...");
    let artifacts = Arc::new(ArtifactStore::new(inpaint_rs::IMAGE_DIR.as_str()));
    artifacts.init().await?;
    let store = Arc::new(JsonFileTaskStore::new(inpaint_rs::TASKS_FILE.as_str()));

    info!("Initializing Task Registry...");
    let registry = Arc::new(
        TaskRegistry::open(
            store,
            artifacts.clone(),
            RegistryConfig {
                capacity: *inpaint_rs::MAX_TASKS,
            },
        )
        .await?,
    );

    let model = Arc::new(ModelSlot::new(model_loader()));
    let token = AccessToken::new(inpaint_rs::ACCESS_TOKEN.clone());
    if !token.is_enabled() {
        info!("INPAINT_ACCESS_TOKEN not set, requests are not authenticated");
    }

    let ctx = Arc::new(AppContext {
        registry: registry.clone(),
        artifacts: artifacts.clone(),
        model: model.clone(),
        token,
        max_upload_bytes: *inpaint_rs::MAX_UPLOAD_BYTES,
    });

    info!("Initializing Scheduler...");
    let scheduler = create_scheduler(
        registry,
        artifacts,
        model,
        WorkerConfig {
            poll_interval: *inpaint_rs::POLL_INTERVAL,
        },
    );
    scheduler.start().await;

    let addr = *inpaint_rs::BIND_ADDR;
    info!("Starting HTTP server at http://{}", addr);
    let served = inpaint_rs::web::start_server(ctx, addr, shutdown_signal()).await;

    info!("Shutting down...");
    scheduler.stop().await;

    match served {
        Ok(()) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e)
        }
    }
}
