//! LaMa exported to ONNX, run through onnxruntime (loaded dynamically, see
//! `ORT_DYLIB_PATH`).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::{Array4, ArrayView4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::{InpaintModel, ModelLoader};

pub struct OnnxInpaintModel {
    session: Mutex<Session>,
}

impl OnnxInpaintModel {
    pub fn new(model_path: &Path, threads: usize) -> Result<Self> {
        if !model_path.exists() {
            anyhow::bail!("model file {} does not exist", model_path.display());
        }
        let session = Session::builder()
            .map_err(|e| anyhow!("failed to create onnx session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("failed to set optimization level: {e}"))?
            .with_intra_threads(threads)
            .map_err(|e| anyhow!("failed to set intra threads: {e}"))?
            .commit_from_file(model_path)
            .map_err(|e| anyhow!("failed to load onnx model {}: {e}", model_path.display()))?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InpaintModel for OnnxInpaintModel {
    fn infer(&self, image: ArrayView4<f32>, mask: ArrayView4<f32>) -> Result<Array4<f32>> {
        let image = Tensor::from_array(image.to_owned())
            .map_err(|e| anyhow!("failed to build image tensor: {e}"))?;
        let mask = Tensor::from_array(mask.to_owned())
            .map_err(|e| anyhow!("failed to build mask tensor: {e}"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("onnx session poisoned: {e}"))?;
        let outputs = session
            .run(ort::inputs![image, mask])
            .map_err(|e| anyhow!("onnx inference failed: {e}"))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| anyhow!("failed to read model output: {e}"))?;
        let output = output
            .into_dimensionality::<Ix4>()
            .context("model output is not 4-dimensional")?;
        Ok(output.to_owned())
    }
}

pub struct OnnxModelLoader {
    model_path: PathBuf,
    threads: usize,
}

impl OnnxModelLoader {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            model_path: model_path.into(),
            threads,
        }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<Arc<dyn InpaintModel>> {
        info!("Loading ONNX model from {}", self.model_path.display());
        let path = self.model_path.clone();
        let threads = self.threads;
        let model = tokio::task::spawn_blocking(move || OnnxInpaintModel::new(&path, threads))
            .await
            .context("model loading task panicked")??;
        Ok(Arc::new(model))
    }
}
