use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::Arc;
use tracing::{debug, info};

use crate::imaging;
use crate::inpaint::InpaintModel;
use crate::schedule::error::TaskError;
use crate::storage::artifact::{ArtifactKind, ArtifactStore};
use crate::utils::fs::write_atomic;

use super::{TaskProcessor, TaskRun};

/// Source + mask in, `{id}_lama.jpg` out.
#[derive(Clone)]
pub struct InpaintProcessor {
    artifacts: Arc<ArtifactStore>,
}

impl InpaintProcessor {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl TaskProcessor for InpaintProcessor {
    async fn process(&self, run: &TaskRun, model: Arc<dyn InpaintModel>) -> Result<()> {
        let id = run.id.as_str();
        let source = self.artifacts.resolve(id, ArtifactKind::Source).await?;
        let mask = self.artifacts.resolve(id, ArtifactKind::Mask).await?;
        info!(
            "Inpainting task {}: source={} mask={}",
            id,
            source.path.display(),
            mask.path.display()
        );

        run.progress(20, "preprocessing image").await?;
        let source_bytes = tokio::fs::read(&source.path)
            .await
            .with_context(|| format!("failed to read {}", source.path.display()))?;
        let (image, width, height) = blocking(move || {
            let decoded = imaging::decode(&source_bytes).context("source image")?;
            let (width, height) = imaging::snap_to_stride(decoded.width(), decoded.height())
                .ok_or_else(|| {
                    anyhow!(
                        "source image {}x{} is smaller than the model stride",
                        decoded.width(),
                        decoded.height()
                    )
                })?;
            let image = imaging::prepare_image(&decoded, width, height);
            Ok((imaging::image_to_tensor(&image), width, height))
        })
        .await?;

        run.progress(40, "preprocessing mask").await?;
        let mask_bytes = tokio::fs::read(&mask.path)
            .await
            .with_context(|| format!("failed to read {}", mask.path.display()))?;
        let (mask, inverted) = blocking(move || {
            let decoded = imaging::decode(&mask_bytes).context("mask image")?;
            let prepared = imaging::prepare_mask(&decoded, width, height);
            let (binary, inverted) = imaging::binarize_mask(&prepared);
            Ok((imaging::mask_to_tensor(binary), inverted))
        })
        .await?;
        if inverted {
            debug!("Mask polarity inverted for task {}", id);
        }

        run.progress(60, "running inference").await?;
        let output: Array4<f32> = blocking(move || {
            model
                .infer(image.view(), mask.view())
                .map_err(|e| TaskError::Inference(format!("{:#}", e)).into())
        })
        .await?;

        run.progress(80, "saving output").await?;
        let encoded = blocking(move || {
            let result = imaging::tensor_to_image(output.view())?;
            imaging::encode_jpeg(&result, imaging::OUTPUT_JPEG_QUALITY)
        })
        .await?;
        let output_path = self.artifacts.output_path(id);
        write_atomic(&output_path, encoded).await?;

        info!("Task {} output saved to {}", id, output_path.display());
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("processing task panicked")?
}
