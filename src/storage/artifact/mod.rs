//! File-backed artifacts (source, mask, output) keyed by task id.
//!
//! Layout inside the store root:
//! - `{id}.{jpg,png,gif}` source image
//! - `{id}_mask.{png,jpg,gif}` mask image
//! - `{id}_lama.jpg` inpainted output
//! - `{id}_thumb.*`, `{id}_lama_thumb.jpg` thumbnails produced by external tooling

use anyhow::{Context, Result};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::schedule::error::{TaskError, TaskResult};
use crate::utils::fs::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Source,
    Mask,
    Output,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "",
            ArtifactKind::Mask => "_mask",
            ArtifactKind::Output => "_lama",
        }
    }

    /// Encodings tried by [`ArtifactStore::resolve`], highest priority first.
    pub fn lookup_order(&self) -> &'static [ImageEncoding] {
        match self {
            ArtifactKind::Source => &[ImageEncoding::Jpg, ImageEncoding::Png, ImageEncoding::Gif],
            ArtifactKind::Mask => &[ImageEncoding::Png, ImageEncoding::Jpg, ImageEncoding::Gif],
            ArtifactKind::Output => &[ImageEncoding::Jpg],
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Source => "source image",
            ArtifactKind::Mask => "mask image",
            ArtifactKind::Output => "output image",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Jpg,
    Png,
    Gif,
}

impl ImageEncoding {
    pub const ALL: [ImageEncoding; 3] = [ImageEncoding::Jpg, ImageEncoding::Png, ImageEncoding::Gif];

    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Jpg => "jpg",
            ImageEncoding::Png => "png",
            ImageEncoding::Gif => "gif",
        }
    }

    /// Detects the encoding from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(ImageEncoding::Jpg)
        } else if bytes.starts_with(&[0x89, 0x50, 0x4e, 0x47]) {
            Some(ImageEncoding::Png)
        } else if bytes.starts_with(b"GIF") {
            Some(ImageEncoding::Gif)
        } else {
            None
        }
    }
}

/// A resolved artifact that existed on disk at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub encoding: ImageEncoding,
    pub path: PathBuf,
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create image directory {}", self.root.display()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str, kind: ArtifactKind, encoding: ImageEncoding) -> PathBuf {
        self.root
            .join(format!("{}{}.{}", id, kind.suffix(), encoding.extension()))
    }

    pub fn output_path(&self, id: &str) -> PathBuf {
        self.path_for(id, ArtifactKind::Output, ImageEncoding::Jpg)
    }

    /// Tries the encodings of `kind` in priority order and returns the first
    /// one present.
    pub async fn resolve(&self, id: &str, kind: ArtifactKind) -> TaskResult<Artifact> {
        for encoding in kind.lookup_order() {
            let path = self.path_for(id, kind, *encoding);
            if exists(&path).await {
                debug!("Resolved {} for {}: {}", kind, id, path.display());
                return Ok(Artifact {
                    id: id.to_string(),
                    kind,
                    encoding: *encoding,
                    path,
                });
            }
        }
        Err(TaskError::ArtifactNotFound {
            id: id.to_string(),
            kind,
        })
    }

    /// Stores an uploaded source or mask, replacing every prior encoding of
    /// the same kind. A new mask invalidates any existing output.
    pub async fn store(
        &self,
        id: &str,
        kind: ArtifactKind,
        encoding: ImageEncoding,
        bytes: Vec<u8>,
    ) -> Result<PathBuf> {
        for other in ImageEncoding::ALL {
            let stale = self.path_for(id, kind, other);
            if other != encoding && exists(&stale).await {
                tokio::fs::remove_file(&stale)
                    .await
                    .with_context(|| format!("failed to remove {}", stale.display()))?;
            }
        }

        let target = self.path_for(id, kind, encoding);
        write_atomic(&target, bytes).await?;

        if kind == ArtifactKind::Mask {
            let removed = self.remove_files(&self.output_files(id)).await;
            if !removed.is_empty() {
                info!("Mask for {} replaced, invalidated output {:?}", id, removed);
            }
        }
        Ok(target)
    }

    /// Copies an existing artifact to `kind` of another task id, keeping its
    /// encoding.
    pub async fn copy(&self, from: &Artifact, to_id: &str, kind: ArtifactKind) -> Result<PathBuf> {
        let bytes = tokio::fs::read(&from.path)
            .await
            .with_context(|| format!("failed to read {}", from.path.display()))?;
        self.store(to_id, kind, from.encoding, bytes).await
    }

    /// Every artifact file of `id` currently on disk, thumbnails included.
    pub async fn existing_files(&self, id: &str) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in self.candidate_files(id) {
            if exists(&path).await {
                files.push(path);
            }
        }
        files
    }

    /// Removes `files`, returning the names of those actually deleted.
    pub async fn remove_files(&self, files: &[PathBuf]) -> Vec<String> {
        let mut deleted = Vec::new();
        for path in files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    if let Some(name) = path.file_name() {
                        deleted.push(name.to_string_lossy().to_string());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
        deleted
    }

    fn output_files(&self, id: &str) -> Vec<PathBuf> {
        vec![
            self.output_path(id),
            self.root.join(format!("{}_lama_thumb.jpg", id)),
        ]
    }

    fn candidate_files(&self, id: &str) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for encoding in ImageEncoding::ALL {
            files.push(self.path_for(id, ArtifactKind::Source, encoding));
            files.push(self.root.join(format!("{}_thumb.{}", id, encoding.extension())));
            files.push(self.path_for(id, ArtifactKind::Mask, encoding));
        }
        files.extend(self.output_files(id));
        files
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
