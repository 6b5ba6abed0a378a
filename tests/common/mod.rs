#![allow(dead_code)]

//! Shared fixtures: an in-process fake of the GCS JSON API and the token endpoint, plus
//! helpers that write key and config files pointing at it.

use axum::body::Bytes;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};

pub const TEST_TOKEN: &str = "fake-access-token";
pub const BUCKET: &str = "backups";
pub const READ_ONLY_BUCKET: &str = "read-only-backups";

#[derive(Default)]
pub struct FakeState {
    pub objects: HashMap<String, Vec<u8>>,
    pub token_requests: usize,
    pub object_lookups: usize,
    pub uploads: usize,
}

#[derive(Clone, Default)]
pub struct FakeGcs {
    pub state: Arc<Mutex<FakeState>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TEST_TOKEN}"))
        .unwrap_or(false)
}

fn known_bucket(bucket: &str) -> bool {
    bucket == BUCKET || bucket == READ_ONLY_BUCKET
}

async fn token(State(gcs): State<FakeGcs>, Form(form): Form<HashMap<String, String>>) -> Response {
    gcs.state.lock().unwrap().token_requests += 1;
    let grant_ok = form.get("grant_type").map(String::as_str)
        == Some("urn:ietf:params:oauth:grant-type:jwt-bearer");
    if !grant_ok || !form.contains_key("assertion") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    Json(json!({"access_token": TEST_TOKEN, "expires_in": 3599, "token_type": "Bearer"}))
        .into_response()
}

async fn get_bucket(Path(bucket): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !known_bucket(&bucket) {
        return (StatusCode::NOT_FOUND, Json(json!({"error": {"code": 404}}))).into_response();
    }
    Json(json!({"kind": "storage#bucket", "name": bucket})).into_response()
}

async fn get_object(
    State(gcs): State<FakeGcs>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut state = gcs.state.lock().unwrap();
    state.object_lookups += 1;
    match state.objects.get(&object) {
        Some(data) if known_bucket(&bucket) => Json(json!({
            "kind": "storage#object",
            "bucket": bucket,
            "name": object,
            "size": data.len().to_string(),
        }))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": {"code": 404}}))).into_response(),
    }
}

async fn upload_object(
    State(gcs): State<FakeGcs>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if bucket == READ_ONLY_BUCKET {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "does not have storage.objects.create access"}})),
        )
            .into_response();
    }
    if query.get("uploadType").map(String::as_str) != Some("media") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let Some(name) = query.get("name").cloned() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let mut state = gcs.state.lock().unwrap();
    state.uploads += 1;
    state.objects.insert(name.clone(), body.to_vec());
    Json(json!({"kind": "storage#object", "bucket": bucket, "name": name})).into_response()
}

impl FakeGcs {
    pub fn with_object(self, name: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(name.to_string(), data.to_vec());
        self
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn object_lookups(&self) -> usize {
        self.state.lock().unwrap().object_lookups
    }

    pub fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests
    }

    /// Serves the fake on an ephemeral port and returns its base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/token", post(token))
            .route("/storage/v1/b/{bucket}", get(get_bucket))
            .route("/storage/v1/b/{bucket}/o/{object}", get(get_object))
            .route("/upload/storage/v1/b/{bucket}/o", post(upload_object))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake gcs");
        let addr = listener.local_addr().expect("fake gcs address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake gcs");
        });
        format!("http://{addr}")
    }
}

/// Writes a service-account key file whose `token_uri` points at `base_url`.
pub fn write_credentials(dir: &FsPath, base_url: &str) -> PathBuf {
    let mut key: serde_json::Value =
        serde_json::from_str(include_str!("../fixtures/service_account.json"))
            .expect("fixture is valid json");
    key["token_uri"] = json!(format!("{base_url}/token"));
    let path = dir.join("service_account.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&key).unwrap()).expect("write key file");
    path
}

/// Writes a `[google]` config file.
pub fn write_config(
    dir: &FsPath,
    credentials: &FsPath,
    bucket: &str,
    endpoint: Option<&str>,
) -> PathBuf {
    let mut text = format!(
        "[google]\nprivate_key_json_file = {}\nbucket = {bucket}\n",
        credentials.display()
    );
    if let Some(endpoint) = endpoint {
        text.push_str(&format!("endpoint = {endpoint}\n"));
    }
    let path = dir.join("config.ini");
    std::fs::write(&path, text).expect("write config file");
    path
}

/// Writes a small local backup file.
pub fn write_backup(dir: &FsPath, contents: &[u8]) -> PathBuf {
    let path = dir.join("db-2026-10-18.sql.gz");
    std::fs::write(&path, contents).expect("write backup file");
    path
}
