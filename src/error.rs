//! User-visible guard outcomes.
//!
//! Every rejection is terminal for the triggering request and is rendered
//! as a JSON body with a boolean `success` field.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub const FORBIDDEN_MESSAGE: &str = "Access denied to this file path";
pub const NOT_FOUND_MESSAGE: &str = "File not found";
pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many download requests. Please try again later.";

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("access denied to this file path")]
    Forbidden,

    #[error("file not found")]
    NotFound,

    #[error("too many download requests (retry after {retry_after:?})")]
    TooManyRequests { retry_after: Duration },

    #[error("upload root unavailable: {0}")]
    UploadRoot(#[source] std::io::Error),
}

impl GuardError {
    /// Label used for the `reason` dimension of rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GuardError::Forbidden => "forbidden",
            GuardError::NotFound => "not_found",
            GuardError::TooManyRequests { .. } => "rate_limited",
            GuardError::UploadRoot(_) => "upload_root",
        }
    }
}

/// JSON envelope shared by every response this service produces itself.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: &'static str,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GuardError::Forbidden => (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE),
            GuardError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
            GuardError::TooManyRequests { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_MESSAGE)
            }
            GuardError::UploadRoot(e) => {
                tracing::error!(error = %e, "upload root unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let mut response = (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response();

        if let GuardError::TooManyRequests { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }

        response
    }
}

/// Whole seconds to advertise in `Retry-After`, rounded up and never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_forbidden_body() {
        let response = GuardError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let response = GuardError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["message"], NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_too_many_requests_sets_retry_after() {
        let response = GuardError::TooManyRequests {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], TOO_MANY_REQUESTS_MESSAGE);
    }

    #[test]
    fn test_retry_after_never_zero() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
    }
}
