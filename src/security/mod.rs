//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request for an uploaded file:
//!     → access_control.rs (path_guard: normalize, allow-list, existence)
//!     → rate_limit.rs (per-client download quota)
//!     → Pass to static file service
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any check failure
//! - No trust in client input
//! - Guards are owned instances injected as middleware state

pub mod access_control;
pub mod path_guard;
pub mod rate_limit;

pub use access_control::file_access_middleware;
pub use path_guard::{normalize_request_path, PathGuard, ALLOWED_PREFIXES};
pub use rate_limit::{
    download_limit_middleware, spawn_sweeper, DownloadLimiter, FixedWindowLimiter,
    RateLimitDecision,
};
