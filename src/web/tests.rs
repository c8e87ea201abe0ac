use super::*;
use crate::auth::AccessToken;
use crate::inpaint::{ModelSlot, UnavailableLoader};
use crate::schedule::scheduler::{RegistryConfig, TaskRegistry};
use crate::storage::artifact::{ArtifactKind, ArtifactStore, ImageEncoding};
use crate::storage::task::InMemoryTaskStore;
use crate::utils::hash::md5_hex;
use image::{Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

struct TestServer {
    base: String,
    ctx: Arc<AppContext>,
    client: reqwest::Client,
    _dir: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn upload(&self, md5: &str, file_name: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
        let form = Form::new()
            .text("md5", md5.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let resp = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }
}

async fn start(token: Option<&str>, max_upload_bytes: usize) -> TestServer {
    let dir = TempDir::new().unwrap();
    let artifacts = Arc::new(ArtifactStore::new(dir.path().join("image")));
    artifacts.init().await.unwrap();
    let registry = TaskRegistry::open(
        Arc::new(InMemoryTaskStore::new()),
        artifacts.clone(),
        RegistryConfig::default(),
    )
    .await
    .unwrap();

    let ctx = Arc::new(AppContext {
        registry: Arc::new(registry),
        artifacts,
        model: Arc::new(ModelSlot::new(Arc::new(UnavailableLoader))),
        token: AccessToken::new(token.map(str::to_string)),
        max_upload_bytes,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, ctx.clone(), std::future::pending()));

    TestServer {
        base: format!("http://{}", addr),
        ctx,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

fn jpeg() -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 16, Rgb([90, 120, 200]));
    crate::imaging::encode_jpeg(&image, 90).unwrap()
}

fn png() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])));
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn test_upload_submit_and_query() {
    let server = start(None, 10 * 1024 * 1024).await;

    let (status, body) = server.upload("abc", "photo.jpg", jpeg()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["md5"], "abc");
    assert_eq!(body["type"], "jpg");
    assert!(body["file_path"].as_str().unwrap().ends_with("abc.jpg"));

    let (status, body) = server.upload("abc", "abc_mask.png", png()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["type"], "png");
    assert!(server
        .ctx
        .artifacts
        .resolve("abc", ArtifactKind::Mask)
        .await
        .is_ok());

    let (status, body) = server.post_json("/lama", json!({"md5": "abc"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["task_id"], "abc");

    let (status, body) = server.get_json("/tasks?md5=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["md5"], "abc");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["progress"], 0);
    assert_eq!(body["message"], "queued");
    assert!(body["end_time"].is_null());
}

#[tokio::test]
async fn test_mask_filename_match_ignores_case() {
    let server = start(None, 10 * 1024 * 1024).await;
    let source = jpeg();
    server.upload("abc", "photo.jpg", source.clone()).await;

    let (status, body) = server.upload("abc", "MyMask.png", png()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["file_path"].as_str().unwrap().ends_with("abc_mask.png"));

    let mask = server
        .ctx
        .artifacts
        .resolve("abc", ArtifactKind::Mask)
        .await
        .unwrap();
    assert_eq!(mask.encoding, ImageEncoding::Png);
    let kept = server
        .ctx
        .artifacts
        .resolve("abc", ArtifactKind::Source)
        .await
        .unwrap();
    assert_eq!(kept.encoding, ImageEncoding::Jpg);
    assert_eq!(std::fs::read(kept.path).unwrap(), source);
}

#[tokio::test]
async fn test_upload_rejects_unknown_format() {
    let server = start(None, 10 * 1024 * 1024).await;
    let (status, body) = server
        .upload("abc", "notes.txt", b"hello world".to_vec())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(server.ctx.artifacts.existing_files("abc").await.is_empty());
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let server = start(None, 1024).await;
    let mut bytes = vec![0xff, 0xd8, 0xff];
    bytes.resize(4096, 0);
    let (status, body) = server.upload("abc", "big.jpg", bytes).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("upload limit"));
}

#[tokio::test]
async fn test_upload_requires_md5() {
    let server = start(None, 10 * 1024 * 1024).await;
    let form = Form::new().part("file", Part::bytes(jpeg()).file_name("a.jpg"));
    let resp = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lama_validates_input() {
    let server = start(None, 10 * 1024 * 1024).await;

    let (status, body) = server.post_json("/lama", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("md5"));

    let (status, _) = server.post_json("/lama", json!({"md5": "../x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .post(server.url("/lama"))
        .header("content-type", "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(server.ctx.registry.is_empty().await);
}

#[tokio::test]
async fn test_query_unknown_task() {
    let server = start(None, 10 * 1024 * 1024).await;
    let (status, body) = server.get_json("/tasks?md5=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_list_tasks_paginated() {
    let server = start(None, 10 * 1024 * 1024).await;
    for id in ["t1", "t2", "t3"] {
        server.ctx.registry.submit(id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let (status, body) = server.get_json("/tasks?page=1&per_page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["per_page"], 2);
    assert_eq!(body["total_pages"], 2);
    let ids: Vec<&String> = body["tasks"].as_object().unwrap().keys().collect();
    assert_eq!(ids.len(), 2);
    assert!(body["tasks"]["t3"].is_object());

    let (status, body) = server.get_json("/tasks?page=zero&per_page=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!((body["page"].clone(), body["per_page"].clone()), (json!(1), json!(5)));
}

#[tokio::test]
async fn test_delete_task_removes_files() {
    let server = start(None, 10 * 1024 * 1024).await;
    server.upload("abc", "a.jpg", jpeg()).await;
    server.upload("abc", "a_mask.png", png()).await;
    server.ctx.registry.submit("abc").await.unwrap();

    server.ctx.registry.claim("abc").await.unwrap();
    let (status, body) = server.post_json("/delete_task", json!({"md5": "abc"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(server.ctx.artifacts.existing_files("abc").await.len(), 2);

    server
        .ctx
        .registry
        .update("abc", crate::schedule::TaskStatus::Error, "failed", None)
        .await
        .unwrap();
    let (status, body) = server.post_json("/delete_task", json!({"md5": "abc"})).await;
    assert_eq!(status, StatusCode::OK);
    let mut deleted: Vec<String> = serde_json::from_value(body["deleted_files"].clone()).unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["abc.jpg", "abc_mask.png"]);
    assert!(server.ctx.artifacts.existing_files("abc").await.is_empty());

    let (status, _) = server.post_json("/delete_task", json!({"md5": "abc"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relama_and_image_download() {
    let server = start(None, 10 * 1024 * 1024).await;
    server.upload("abc", "a_mask.png", png()).await;
    let output = jpeg();
    server
        .ctx
        .artifacts
        .store("abc", ArtifactKind::Output, ImageEncoding::Jpg, output.clone())
        .await
        .unwrap();

    let resp = server
        .client
        .get(server.url("/image/abc_lama.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().to_vec(), output);

    let (status, body) = server.post_json("/relama", json!({"md5": "abc"})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let new_md5 = md5_hex(&output);
    assert_eq!(body["new_md5"], new_md5.as_str());
    assert_eq!(
        server.ctx.registry.status(&new_md5).await.unwrap().status,
        crate::schedule::TaskStatus::Pending
    );

    let (status, _) = server.post_json("/relama", json!({"md5": "nothing"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_path_traversal_refused() {
    let server = start(None, 10 * 1024 * 1024).await;
    let resp = server
        .client
        .get(server.url("/image/../Cargo.toml"))
        .send()
        .await
        .unwrap();
    assert_ne!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_access_token() {
    let server = start(Some("s3cret"), 10 * 1024 * 1024).await;

    let (status, body) = server.get_json("/tasks").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _) = server.get_json("/tasks?token=wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.get_json("/tasks?token=s3cret").await;
    assert_eq!(status, StatusCode::OK);

    let resp = server
        .client
        .get(server.url("/tasks"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let server = start(None, 10 * 1024 * 1024).await;
    server.ctx.registry.submit("abc").await.unwrap();

    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "unloaded");
    assert_eq!(body["tasks"], 1);

    let _ = server.ctx.model.ensure().await;
    let (_, body) = server.get_json("/health").await;
    assert_eq!(body["model"], "failed");
}
