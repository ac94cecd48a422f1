//! HTTP API tests.
//!
//! Drive the axum router in-process with `tower::ServiceExt::oneshot`.

#![cfg(feature = "http")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines
)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use todo_list_service::ServiceConfig;
use todo_list_service::http::{AppState, router};
use todo_list_service::storage::{
    ArticleStore, InMemoryArticleStore, InMemoryTodoStore, SqliteArticleStore, SqliteTodoStore,
    TodoItemStore,
};
use tower::ServiceExt;

const BOUNDARY: &str = "X-TEST-BOUNDARY";

struct Harness {
    app: Router,
    images: TempDir,
}

impl Harness {
    fn with_stores(todos: Arc<dyn TodoItemStore>, articles: Arc<dyn ArticleStore>) -> Self {
        let images = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default().with_image_directory(images.path());
        config.max_return_array_size = 3;
        let app = router(AppState::new(todos, articles, &config));
        Self { app, images }
    }

    fn memory() -> Self {
        Self::with_stores(
            Arc::new(InMemoryTodoStore::new()),
            Arc::new(InMemoryArticleStore::new()),
        )
    }

    fn sqlite() -> Self {
        Self::with_stores(
            Arc::new(SqliteTodoStore::in_memory().unwrap()),
            Arc::new(SqliteArticleStore::in_memory().unwrap()),
        )
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn create_todo(&self, body: Value) -> String {
        let (status, body) = self.call(Method::POST, "/todo", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_article(&self, title: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/articles",
                Some(json!({
                    "title": title,
                    "expirationDate": "2100-01-01T00:00:00Z",
                    "description": "body",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn upload(&self, article_id: &str, field: &str, content: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"pic.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/articles/{article_id}/images"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

// ============================================================================
// Todo routes
// ============================================================================

#[tokio::test]
async fn test_create_and_fetch_todo() {
    let h = Harness::memory();
    let id = h
        .create_todo(json!({"title": "Buy milk", "dueDate": "2030-01-01T10:00:00Z"}))
        .await;

    let (status, body) = h.call(Method::GET, &format!("/todo/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"id": id, "title": "Buy milk", "dueDate": "2030-01-01T10:00:00Z"})
    );
}

#[tokio::test]
async fn test_todo_lookup_errors() {
    let h = Harness::memory();

    let (status, body) = h.call(Method::GET, "/todo/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"errors": ["failed to decode id"]}));

    let ghost = todo_list_service::RecordId::generate();
    let (status, body) = h.call(Method::GET, &format!("/todo/{ghost}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_todo_bodies_are_bad_requests() {
    let h = Harness::memory();
    for body in [
        json!({"dueDate": "2030-01-01T10:00:00Z"}),
        json!({"title": "x"}),
        json!({"title": "", "dueDate": "2030-01-01T10:00:00Z"}),
        json!({"title": "x", "dueDate": "yesterday"}),
        json!({"title": "x", "dueDate": "+10000-01-01T00:00:00Z"}),
    ] {
        let (status, response) = h.call(Method::POST, "/todo", Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["errors"].is_array());
    }
}

#[tokio::test]
async fn test_rejected_due_date_leaves_listing_readable() {
    let h = Harness::sqlite();
    h.create_todo(json!({"title": "ok", "dueDate": "2030-01-01T10:00:00Z"}))
        .await;

    let (status, _) = h
        .call(
            Method::POST,
            "/todo",
            Some(json!({"title": "far", "dueDate": "+10000-01-01T00:00:00Z"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.call(Method::GET, "/todo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_routes_are_capped() {
    let h = Harness::sqlite();
    for i in 0..5 {
        h.create_todo(json!({
            "title": format!("t{i}"),
            "dueDate": "2030-01-01T10:00:00Z",
            "labels": ["all"],
        }))
        .await;
    }

    let (status, body) = h.call(Method::GET, "/todo", None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["t0", "t1", "t2"]);

    let (_, body) = h.call(Method::GET, "/todo/label/all", None).await;
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (_, body) = h.call(Method::GET, "/todo/label/none", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_update_todo() {
    let h = Harness::memory();
    let id = h
        .create_todo(json!({"title": "Old", "dueDate": "2030-01-01T10:00:00Z", "labels": ["a"]}))
        .await;

    let replacement = json!({
        "title": "New",
        "dueDate": "2031-02-02T00:00:00Z",
        "labels": ["b"],
        "description": "d",
        "completed": true,
    });
    let (status, body) = h
        .call(Method::PUT, &format!("/todo/{id}"), Some(replacement))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "New");
    assert_eq!(body["labels"], json!(["b"]));
    assert_eq!(body["completed"], true);

    let ghost = todo_list_service::RecordId::generate();
    let (status, _) = h
        .call(
            Method::PUT,
            &format!("/todo/{ghost}"),
            Some(json!({"title": "x", "dueDate": "2030-01-01T10:00:00Z"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_label_routes() {
    let h = Harness::memory();
    let id = h
        .create_todo(json!({"title": "Task", "dueDate": "2030-01-01T10:00:00Z"}))
        .await;
    let labels_uri = |label: &str| format!("/todo/{id}/labels/{label}");

    let (status, body) = h.call(Method::POST, &labels_uri("home"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["labels"], json!(["home"]));

    let (_, body) = h.call(Method::POST, &labels_uri("home"), None).await;
    assert_eq!(body["labels"], json!(["home"]));

    let (status, body) = h.call(Method::DELETE, &labels_uri("work"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["labels"], json!(["home"]));

    let (_, body) = h.call(Method::DELETE, &labels_uri("home"), None).await;
    assert!(body.get("labels").is_none());

    let ghost = todo_list_service::RecordId::generate();
    let (status, _) = h
        .call(Method::POST, &format!("/todo/{ghost}/labels/home"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let h = Harness::memory();
    let id = h
        .create_todo(json!({"title": "Doomed", "dueDate": "2030-01-01T10:00:00Z"}))
        .await;

    let (status, _) = h.call(Method::DELETE, &format!("/todo/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call(Method::DELETE, &format!("/todo/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call(Method::GET, &format!("/todo/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_headers() {
    let h = Harness::memory();
    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/todo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
}

// ============================================================================
// Article routes
// ============================================================================

#[tokio::test]
async fn test_article_validation() {
    let h = Harness::memory();
    let (status, _) = h
        .call(
            Method::POST,
            "/articles",
            Some(json!({"title": "t", "expirationDate": "2100-01-01T00:00:00Z"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            Method::POST,
            "/articles",
            Some(json!({
                "title": "t",
                "expirationDate": "2100-01-01T00:00:00Z",
                "description": "x".repeat(4001),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_and_title_filters() {
    let h = Harness::sqlite();
    let plain = h.create_article("plain").await;
    let pictured = h.create_article("pictured").await;
    assert_ne!(plain, pictured);

    let (status, body) = h.upload(&pictured, "file", b"\x89PNG fake").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    assert_eq!(std::fs::read_dir(h.images.path()).unwrap().count(), 1);

    let (_, body) = h.call(Method::GET, "/articles?withImages=true", None).await;
    assert_eq!(body, json!(["pictured"]));
    let (_, body) = h.call(Method::GET, "/articles?withImages=0", None).await;
    assert_eq!(body, json!(["plain"]));
    let (_, body) = h.call(Method::GET, "/articles?withImages=maybe", None).await;
    assert_eq!(body, json!(["plain", "pictured"]));
    let (_, body) = h.call(Method::GET, "/articles", None).await;
    assert_eq!(body, json!(["plain", "pictured"]));
}

#[tokio::test]
async fn test_upload_limits() {
    let h = Harness::memory();
    let id = h.create_article("gallery").await;

    for _ in 0..3 {
        let (status, _) = h.upload(&id, "file", b"img").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = h.upload(&id, "file", b"img").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(std::fs::read_dir(h.images.path()).unwrap().count(), 3);

    let other = h.create_article("big").await;
    let oversized = vec![0u8; 5 * 1024 * 1024 + 1];
    let (status, _) = h.upload(&other, "file", &oversized).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.upload(&other, "attachment", b"img").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_respect_image_limit() {
    let h = Arc::new(Harness::sqlite());
    let id = h.create_article("contested").await;

    let uploads: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            let id = id.clone();
            tokio::spawn(async move { h.upload(&id, "file", b"img").await.0 })
        })
        .collect();

    let mut accepted = 0;
    let mut forbidden = 0;
    for upload in uploads {
        match upload.await.unwrap() {
            StatusCode::OK => accepted += 1,
            StatusCode::FORBIDDEN => forbidden += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(forbidden, 5);
    assert_eq!(std::fs::read_dir(h.images.path()).unwrap().count(), 3);

    let (_, body) = h.call(Method::GET, "/articles?withImages=true", None).await;
    assert_eq!(body, json!(["contested"]));
}

#[tokio::test]
async fn test_upload_to_unknown_article() {
    let h = Harness::memory();
    let ghost = todo_list_service::RecordId::generate().to_string();
    let (status, _) = h.upload(&ghost, "file", b"img").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.upload("nope", "file", b"img").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(h.images.path()).unwrap().count(), 0);
}
