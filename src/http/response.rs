//! Responses produced by the service itself.
//!
//! Guard rejections live in [`crate::error::GuardError`]; successful file
//! responses come straight from the static file service.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub success: bool,
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        success: true,
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
