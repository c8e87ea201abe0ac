//! Re-inpaint a finished result with the mask it was produced from.

use anyhow::Context;
use tracing::info;

use crate::schedule::error::{TaskError, TaskResult};
use crate::schedule::scheduler::TaskRegistry;
use crate::storage::artifact::{ArtifactKind, ArtifactStore};
use crate::utils::hash::md5_hex;

/// Submits the output of `id` as the source of a new task, keyed by the md5 of
/// the output bytes and reusing the mask of `id`. Returns the new id.
pub async fn resubmit_from_output(
    registry: &TaskRegistry,
    artifacts: &ArtifactStore,
    id: &str,
) -> TaskResult<String> {
    let output = artifacts.resolve(id, ArtifactKind::Output).await?;
    let mask = artifacts.resolve(id, ArtifactKind::Mask).await?;

    let bytes = tokio::fs::read(&output.path)
        .await
        .with_context(|| format!("failed to read {}", output.path.display()))
        .map_err(TaskError::Persistence)?;
    let new_id = md5_hex(&bytes);

    artifacts
        .store(&new_id, ArtifactKind::Source, output.encoding, bytes)
        .await
        .map_err(TaskError::Persistence)?;
    if new_id != id {
        artifacts
            .copy(&mask, &new_id, ArtifactKind::Mask)
            .await
            .map_err(TaskError::Persistence)?;
    }

    registry.submit(&new_id).await?;
    info!("Task {} resubmitted as {}", id, new_id);
    Ok(new_id)
}
