//! File access middleware.
//! Enforces the upload path rules before anything is served.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::observability::metrics;
use crate::security::path_guard::PathGuard;
use crate::security::rate_limit::client_id;

/// Rejects requests whose path is outside the allowed upload directories
/// or has no backing file. Accepted requests pass through untouched.
pub async fn file_access_middleware(
    State(guard): State<Arc<PathGuard>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let verdict = guard.validate(request.uri().path()).await;

    match verdict {
        Ok(resolved) => {
            tracing::trace!(
                path = %request.uri().path(),
                resolved = %resolved.display(),
                "File access granted"
            );
            next.run(request).await
        }
        Err(rejection) => {
            tracing::warn!(
                client = %client_id(&request),
                path = %request.uri().path(),
                reason = rejection.reason(),
                "File access rejected"
            );
            metrics::record_rejection(rejection.reason());
            rejection.into_response()
        }
    }
}
