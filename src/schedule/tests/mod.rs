
use anyhow::Result;
use async_trait::async_trait;
use image::{GrayImage, Luma, Rgb, RgbImage};
use indexmap::IndexMap;
use ndarray::{Array4, ArrayView4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::inpaint::{InpaintModel, ModelLoader, ModelSlot};
use crate::schedule::scheduler::{RegistryConfig, TaskRegistry, WorkerConfig};
use crate::schedule::types::{Task, TaskStatus};
use crate::schedule::{create_scheduler, TaskScheduler};
use crate::storage::artifact::{ArtifactKind, ArtifactStore, ImageEncoding};
use crate::storage::task::{InMemoryTaskStore, TaskStore};

/// Returns the source unchanged.
struct Identity;

impl InpaintModel for Identity {
    fn infer(&self, image: ArrayView4<f32>, _mask: ArrayView4<f32>) -> Result<Array4<f32>> {
        Ok(image.to_owned())
    }
}

struct Broken;

impl InpaintModel for Broken {
    fn infer(&self, _image: ArrayView4<f32>, _mask: ArrayView4<f32>) -> Result<Array4<f32>> {
        anyhow::bail!("out of memory")
    }
}

/// Fails the first `failures` loads, then hands out `model`.
struct FlakyLoader {
    failures: usize,
    calls: AtomicUsize,
    model: Arc<dyn InpaintModel>,
}

impl FlakyLoader {
    fn new(failures: usize, model: Arc<dyn InpaintModel>) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            model,
        }
    }
}

#[async_trait]
impl ModelLoader for FlakyLoader {
    async fn load(&self) -> Result<Arc<dyn InpaintModel>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("model file missing");
        }
        Ok(self.model.clone())
    }
}

/// In-memory store whose writes can be switched off.
#[derive(Default)]
struct FailingStore {
    inner: InMemoryTaskStore,
    fail: AtomicBool,
}

impl FailingStore {
    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for FailingStore {
    async fn load(&self) -> Result<IndexMap<String, Task>> {
        self.inner.load().await
    }

    async fn save(&self, tasks: &IndexMap<String, Task>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.save(tasks).await
    }
}

struct TestEnv {
    registry: Arc<TaskRegistry>,
    artifacts: Arc<ArtifactStore>,
    store: Arc<FailingStore>,
    _dir: TempDir,
}

async fn setup(capacity: usize) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let artifacts = Arc::new(ArtifactStore::new(dir.path().join("image")));
    artifacts.init().await.unwrap();
    let store = Arc::new(FailingStore::default());
    let registry = TaskRegistry::open(store.clone(), artifacts.clone(), RegistryConfig { capacity })
        .await
        .unwrap();
    TestEnv {
        registry: Arc::new(registry),
        artifacts,
        store,
        _dir: dir,
    }
}

fn scheduler_with(env: &TestEnv, loader: Arc<dyn ModelLoader>) -> TaskScheduler {
    create_scheduler(
        env.registry.clone(),
        env.artifacts.clone(),
        Arc::new(ModelSlot::new(loader)),
        WorkerConfig {
            poll_interval: Duration::from_millis(20),
        },
    )
}

fn png_bytes(image: &image::DynamicImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

async fn put_source(env: &TestEnv, id: &str) {
    let source = RgbImage::from_fn(24, 20, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 128]));
    let bytes = png_bytes(&image::DynamicImage::ImageRgb8(source));
    env.artifacts
        .store(id, ArtifactKind::Source, ImageEncoding::Png, bytes)
        .await
        .unwrap();
}

async fn put_mask(env: &TestEnv, id: &str) {
    let mask = GrayImage::from_fn(24, 20, |x, _| Luma([if x < 12 { 255 } else { 0 }]));
    let bytes = png_bytes(&image::DynamicImage::ImageLuma8(mask));
    env.artifacts
        .store(id, ArtifactKind::Mask, ImageEncoding::Png, bytes)
        .await
        .unwrap();
}

/// Polls until `id` reaches a terminal status.
async fn wait_terminal(registry: &TaskRegistry, id: &str) -> Task {
    for _ in 0..250 {
        if let Ok(task) = registry.status(id).await {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} did not finish in time", id);
}

fn assert_status(task: &Task, status: TaskStatus) {
    assert_eq!(task.status, status, "unexpected task: {:?}", task);
}
