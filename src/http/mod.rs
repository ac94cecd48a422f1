//! HTTP surface.
//!
//! Thin axum handlers over the record stores. Each request runs its store
//! calls on the blocking pool under an [`OpContext`] carrying the configured
//! deadline; if the client goes away the context is cancelled and the store
//! call stops at its next checkpoint.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/todo` | [`todo::find_all`] |
//! | POST | `/todo` | [`todo::create`] |
//! | GET | `/todo/label/{label}` | [`todo::find_by_label`] |
//! | GET / PUT / DELETE | `/todo/{id}` | [`todo::find_one`], [`todo::update`], [`todo::delete`] |
//! | POST / DELETE | `/todo/{id}/labels/{label}` | [`todo::add_label`], [`todo::remove_label`] |
//! | GET | `/articles?withImages=` | [`article::find_titles`] |
//! | POST | `/articles` | [`article::create`] |
//! | POST | `/articles/{articleId}/images` | [`article::attach_image`] |

pub mod article;
pub mod error;
pub mod todo;

pub use error::ApiError;

use crate::config::ServiceConfig;
use crate::models::RecordId;
use crate::storage::{ArticleStore, OpContext, TodoItemStore};
use crate::{Error, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use error::ErrorMessages;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Request body limit on the image upload route. Leaves room for multipart
/// framing around an image of [`article::MAX_IMAGE_SIZE`] bytes.
const UPLOAD_BODY_LIMIT: usize = article::MAX_IMAGE_SIZE * 2;

/// One async lock per article, held by an upload from the image-count
/// check until its path is appended.
///
/// Entries are weak, so an article's lock lives only while an upload holds
/// or waits on it.
#[derive(Debug, Default)]
struct ArticleLocks {
    locks: Mutex<HashMap<RecordId, Weak<tokio::sync::Mutex<()>>>>,
}

impl ArticleLocks {
    fn lock_for(&self, id: RecordId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(id, Arc::downgrade(&lock));
        lock
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    todos: Arc<dyn TodoItemStore>,
    articles: Arc<dyn ArticleStore>,
    max_return_array_size: usize,
    operation_timeout: Duration,
    image_directory: PathBuf,
    upload_locks: Arc<ArticleLocks>,
}

impl AppState {
    /// Builds handler state from the stores and service configuration.
    pub fn new(
        todos: Arc<dyn TodoItemStore>,
        articles: Arc<dyn ArticleStore>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            todos,
            articles,
            max_return_array_size: config.max_return_array_size,
            operation_timeout: config.operation_timeout,
            image_directory: config.image_directory.clone(),
            upload_locks: Arc::new(ArticleLocks::default()),
        }
    }

    /// Runs blocking store work under a fresh per-request context.
    ///
    /// The context is cancelled if the returned future is dropped before
    /// the work finishes.
    async fn run_blocking<T, F>(&self, f: F) -> std::result::Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&OpContext) -> Result<T> + Send + 'static,
    {
        let ctx = OpContext::with_timeout(self.operation_timeout);
        let guard = ctx.cancel_on_drop();
        let joined = tokio::task::spawn_blocking(move || f(&ctx)).await;
        guard.disarm();
        match joined {
            Ok(result) => result.map_err(ApiError::from),
            Err(e) => Err(ApiError::internal(format!("store task failed: {e}"))),
        }
    }
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/todo", get(todo::find_all).post(todo::create))
        .route("/todo/label/{label}", get(todo::find_by_label))
        .route(
            "/todo/{id}",
            get(todo::find_one).put(todo::update).delete(todo::delete),
        )
        .route(
            "/todo/{id}/labels/{label}",
            post(todo::add_label).delete(todo::remove_label),
        )
        .route(
            "/articles",
            get(article::find_titles).post(article::create),
        )
        .route(
            "/articles/{article_id}/images",
            post(article::attach_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .layer(middleware::from_fn(log_failures))
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Logs each failed request once, with the messages its handler produced.
async fn log_failures(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;

    let status = response.status();
    if let Some(ErrorMessages(messages)) = response.extensions().get::<ErrorMessages>() {
        for message in messages {
            if status.is_server_error() {
                tracing::error!(%method, %uri, status = status.as_u16(), error = %message, "Request failed");
            } else {
                tracing::warn!(%method, %uri, status = status.as_u16(), error = %message, "Request rejected");
            }
        }
        metrics::counter!("http_request_errors_total", "status" => status.as_str().to_string())
            .increment(1);
    }
    response
}

/// Binds `address` and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the socket cannot be bound or the
/// server fails.
pub async fn serve<F>(state: AppState, address: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "bind_http".to_string(),
            cause: e.to_string(),
        })?;

    tracing::info!(address = %address, "Starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "serve_http".to_string(),
            cause: e.to_string(),
        })
}
