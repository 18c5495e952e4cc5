#![allow(dead_code)]

use std::sync::Arc;

use atalho::blob::LocalBlobStore;
use atalho::db::{self, DbConnection};
use atalho::suggestions::SuggestionService;
use atalho::{router, AppState, Config};
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BASE_URL: &str = "http://localhost:3000";
const BOUNDARY: &str = "atalho-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub db: DbConnection,
    pub _blob_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response is json")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header")
    }
}

fn test_config() -> Config {
    Config {
        public_base_url: BASE_URL.to_string(),
        ..Config::default()
    }
}

/// Suggestion service pointed at a port nothing listens on.
pub fn offline_suggestions() -> SuggestionService {
    SuggestionService::new(None, "http://127.0.0.1:9".into(), "test-model".into()).unwrap()
}

/// App backed by in-memory SQLite and a temp-dir blob store.
pub async fn setup_test_app() -> TestApp {
    let blob_dir = tempfile::tempdir().unwrap();
    let db = db::open_in_memory().unwrap();
    let blobs = LocalBlobStore::new(blob_dir.path(), BASE_URL).await.unwrap();
    let state = AppState::new(
        test_config(),
        Some(db.clone()),
        Some(Arc::new(blobs)),
        offline_suggestions(),
    );
    TestApp {
        router: router(state),
        db,
        _blob_dir: blob_dir,
    }
}

/// App with nothing configured.
pub fn setup_bare_app() -> Router {
    router(AppState::new(test_config(), None, None, offline_suggestions()))
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse { status, headers, body }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(app: &Router, uri: &str) -> TestResponse {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

pub async fn json_request(app: &Router, method: Method, uri: &str, body: &Value) -> TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> TestResponse {
    json_request(app, Method::POST, uri, body).await
}

/// Posts `application/x-www-form-urlencoded` pairs, as a browser form does.
pub async fn post_form(app: &Router, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub enum Part<'a> {
    File {
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub async fn post_multipart(app: &Router, uri: &str, parts: &[Part<'_>]) -> TestResponse {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}").as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn upload(app: &Router, filename: &str, data: &[u8]) -> TestResponse {
    post_multipart(
        app,
        "/api/upload",
        &[Part::File {
            filename,
            content_type: "application/octet-stream",
            data,
        }],
    )
    .await
}
