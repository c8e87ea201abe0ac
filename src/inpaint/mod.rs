use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array4, ArrayView4};
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::schedule::error::{TaskError, TaskResult};

#[cfg(feature = "onnx")]
pub mod onnx;

/// The inpainting network, treated as an opaque capability.
///
/// `image` is `1×3×H×W` in 0–1, `mask` is `1×1×H×W` with 1 marking the region
/// to fill. Returns `1×3×H×W` in 0–1.
pub trait InpaintModel: Send + Sync {
    fn infer(&self, image: ArrayView4<f32>, mask: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Produces a ready model. Expensive, so it is called lazily and at most once
/// per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn InpaintModel>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

impl Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Unloaded => f.write_str("unloaded"),
            ModelState::Loading => f.write_str("loading"),
            ModelState::Ready => f.write_str("ready"),
            ModelState::Failed(_) => f.write_str("failed"),
        }
    }
}

struct SlotInner {
    state: ModelState,
    model: Option<Arc<dyn InpaintModel>>,
}

/// Lazily initialised model with a visible state. Only the worker drives
/// `ensure`; anyone may read `state`.
pub struct ModelSlot {
    loader: Arc<dyn ModelLoader>,
    inner: Mutex<SlotInner>,
}

impl ModelSlot {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            inner: Mutex::new(SlotInner {
                state: ModelState::Unloaded,
                model: None,
            }),
        }
    }

    pub fn state(&self) -> ModelState {
        self.inner
            .lock()
            .map(|inner| inner.state.clone())
            .unwrap_or_else(|e| ModelState::Failed(e.to_string()))
    }

    fn ready_model(&self) -> Option<Arc<dyn InpaintModel>> {
        self.inner.lock().ok().and_then(|inner| inner.model.clone())
    }

    fn set(&self, state: ModelState, model: Option<Arc<dyn InpaintModel>>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = state;
            inner.model = model;
        }
    }

    /// Returns the loaded model, loading it first if needed. A failed load
    /// leaves the slot `Failed`; the next call tries again.
    pub async fn ensure(&self) -> TaskResult<Arc<dyn InpaintModel>> {
        if let Some(model) = self.ready_model() {
            return Ok(model);
        }

        info!("Loading inpainting model...");
        self.set(ModelState::Loading, None);
        match self.loader.load().await {
            Ok(model) => {
                info!("Inpainting model loaded");
                self.set(ModelState::Ready, Some(model.clone()));
                Ok(model)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!("Failed to load inpainting model: {}", reason);
                self.set(ModelState::Failed(reason.clone()), None);
                Err(TaskError::ModelUnavailable(reason))
            }
        }
    }
}

/// Loader used when the binary was built without an inference backend.
pub struct UnavailableLoader;

#[async_trait]
impl ModelLoader for UnavailableLoader {
    async fn load(&self) -> Result<Arc<dyn InpaintModel>> {
        anyhow::bail!("no inference backend compiled in, rebuild with `--features onnx`")
    }
}
