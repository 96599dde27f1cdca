//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guards and server produce:
//!     → logging.rs (structured log events, rejection audit trail)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line via the trace span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
