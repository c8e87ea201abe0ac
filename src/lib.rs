pub mod auth;
pub mod imaging;
pub mod inpaint;
pub mod schedule;
pub mod storage;
pub mod utils;
pub mod web;

use auth::AccessToken;
use inpaint::ModelSlot;
use once_cell::sync::Lazy;
use schedule::TaskRegistry;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::{env, time::Duration};
use storage::artifact::ArtifactStore;

/// Everything a request handler may touch.
pub struct AppContext {
    pub registry: Arc<TaskRegistry>,
    pub artifacts: Arc<ArtifactStore>,
    pub model: Arc<ModelSlot>,
    pub token: AccessToken,
    pub max_upload_bytes: usize,
}

const DEFAULT_IMAGE_DIR: &str = "./image";
const DEFAULT_TASKS_FILE: &str = "./tasks.json";
const DEFAULT_MODEL_PATH: &str = "./big-lama/models/big-lama.onnx";
const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_MAX_TASKS: usize = 1000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => Some(value),
        Err(_) => dotenv::var(key).ok(),
    }
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    var(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

pub static BIND_ADDR: Lazy<SocketAddr> = Lazy::new(|| {
    parsed_or("INPAINT_BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 8000)))
});

pub static IMAGE_DIR: Lazy<String> = Lazy::new(|| var_or("INPAINT_IMAGE_DIR", DEFAULT_IMAGE_DIR));

pub static TASKS_FILE: Lazy<String> =
    Lazy::new(|| var_or("INPAINT_TASKS_FILE", DEFAULT_TASKS_FILE));

pub static MODEL_PATH: Lazy<String> =
    Lazy::new(|| var_or("INPAINT_MODEL_PATH", DEFAULT_MODEL_PATH));

pub static LOG_DIR: Lazy<String> = Lazy::new(|| var_or("INPAINT_LOG_DIR", DEFAULT_LOG_DIR));

pub static MAX_TASKS: Lazy<usize> =
    Lazy::new(|| parsed_or("INPAINT_MAX_TASKS", DEFAULT_MAX_TASKS).max(1));

pub static POLL_INTERVAL: Lazy<Duration> = Lazy::new(|| {
    Duration::from_millis(parsed_or("INPAINT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS))
});

pub static ACCESS_TOKEN: Lazy<Option<String>> = Lazy::new(|| var("INPAINT_ACCESS_TOKEN"));

pub static MAX_UPLOAD_BYTES: Lazy<usize> =
    Lazy::new(|| parsed_or("INPAINT_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES));

pub fn init_env() {
    dotenv::dotenv().ok();

    // make sure the tasks file has somewhere to live
    if let Some(dir) = std::path::Path::new(TASKS_FILE.as_str()).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create tasks file directory: {}", e);
            });
        }
    }
}
