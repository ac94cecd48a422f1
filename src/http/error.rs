//! HTTP error responses.
//!
//! Every failure leaves the service as `{"errors": ["..."]}` with a status
//! derived from the error kind. The messages are also attached to the
//! response extensions so the logging middleware can report them once.

use crate::{Error, PersistenceErrorKind};
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Messages of a failed request, stored in response extensions.
#[derive(Debug, Clone)]
pub struct ErrorMessages(pub Vec<String>);

/// An error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    messages: Vec<String>,
}

impl ApiError {
    /// Creates an error with a single message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            messages: vec![message.into()],
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the error messages.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Persistence { kind, .. } => match kind {
                PersistenceErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                PersistenceErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
                PersistenceErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Decoding { .. } | Error::Config(_) | Error::OperationFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "errors": self.messages }));
        let mut response = (self.status, body).into_response();
        response
            .extensions_mut()
            .insert(ErrorMessages(self.messages));
        response
    }
}
