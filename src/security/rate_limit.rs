//! Per-client download rate limiting.
//!
//! A fixed-window counter keyed by client address. A client may issue
//! `max_downloads` requests per window; the window restarts on the first
//! request after it ends. Bursts straddling a boundary can reach twice the
//! cap, which is a property of fixed windows and is kept as-is.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{connect_info::MockConnectInfo, ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::GuardError;
use crate::observability::metrics;

/// Key shared by every request whose peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

pub const DEFAULT_MAX_DOWNLOADS: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after: Duration },
}

/// A download quota shared by the file-serving pipeline.
///
/// Implementations must make the read-check-increment for a single client
/// atomic. The in-process [`FixedWindowLimiter`] is the default; a shared
/// store can be substituted without touching the middleware.
pub trait DownloadLimiter: Send + Sync {
    /// Count one request from `client_id` and decide whether it may proceed.
    fn check(&self, client_id: &str) -> RateLimitDecision;

    /// Number of clients currently holding state.
    fn tracked_clients(&self) -> usize;

    /// Drop state for clients whose window has ended. Returns the number removed.
    fn sweep_expired(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    reset_at: Instant,
}

impl WindowRecord {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }
}

/// In-memory fixed-window limiter.
pub struct FixedWindowLimiter {
    records: DashMap<String, WindowRecord>,
    max_downloads: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_downloads: u32, window: Duration) -> Self {
        Self {
            records: DashMap::new(),
            max_downloads,
            window,
        }
    }

    pub fn max_downloads(&self) -> u32 {
        self.max_downloads
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check against an explicit clock reading.
    ///
    /// The entry holds the shard write lock until the decision is made, so
    /// concurrent requests from one client are serialized.
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        match self.records.entry(client_id.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(WindowRecord::fresh(now, self.window));
                RateLimitDecision::Allow
            }
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if now > record.reset_at {
                    *record = WindowRecord::fresh(now, self.window);
                    RateLimitDecision::Allow
                } else if record.count >= self.max_downloads {
                    RateLimitDecision::Deny {
                        retry_after: record.reset_at.saturating_duration_since(now),
                    }
                } else {
                    record.count += 1;
                    RateLimitDecision::Allow
                }
            }
        }
    }

    /// Whether `client_id` currently holds a window record.
    pub fn is_tracked(&self, client_id: &str) -> bool {
        self.records.contains_key(client_id)
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now <= record.reset_at);
        before.saturating_sub(self.records.len())
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOWNLOADS, DEFAULT_WINDOW)
    }
}

impl DownloadLimiter for FixedWindowLimiter {
    fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now())
    }

    fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }
}

/// Periodically evict expired records until shutdown is signalled.
pub fn spawn_sweeper(
    limiter: Arc<dyn DownloadLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = limiter.sweep_expired();
                    let remaining = limiter.tracked_clients();
                    metrics::record_rate_limit_sweep(evicted, remaining);
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining, "Rate limiter sweep completed");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::debug!("Rate limiter sweeper stopped");
    })
}

/// Client identifier for rate limiting: the peer IP, or [`UNKNOWN_CLIENT`].
///
/// Resolves the peer the same way the `ConnectInfo` extractor does: the
/// connection's address first, then a `MockConnectInfo` fallback.
pub fn client_id<B>(request: &Request<B>) -> String {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware enforcing the download quota.
pub async fn download_limit_middleware(
    State(limiter): State<Arc<dyn DownloadLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_id(&request);

    match limiter.check(&client) {
        RateLimitDecision::Allow => {
            metrics::record_download_allowed();
            next.run(request).await
        }
        RateLimitDecision::Deny { retry_after } => {
            let rejection = GuardError::TooManyRequests { retry_after };
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Download rate limit exceeded"
            );
            metrics::record_rejection(rejection.reason());
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    #[test]
    fn test_defaults() {
        let limiter = FixedWindowLimiter::default();
        assert_eq!(limiter.max_downloads(), 100);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_quota_within_window() {
        let limiter = FixedWindowLimiter::default();
        let start = Instant::now();

        for i in 0..100 {
            let now = start + Duration::from_millis(i * 100);
            assert_eq!(limiter.check_at("10.0.0.1", now), RateLimitDecision::Allow, "request {i}");
        }

        let decision = limiter.check_at("10.0.0.1", start + Duration::from_secs(30));
        assert_eq!(
            decision,
            RateLimitDecision::Deny {
                retry_after: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_new_window_after_reset() {
        let limiter = FixedWindowLimiter::default();
        let start = Instant::now();

        for _ in 0..100 {
            limiter.check_at("10.0.0.1", start);
        }
        assert!(matches!(
            limiter.check_at("10.0.0.1", start + Duration::from_secs(59)),
            RateLimitDecision::Deny { .. }
        ));
        assert_eq!(
            limiter.check_at("10.0.0.1", start + Duration::from_secs(61)),
            RateLimitDecision::Allow
        );
    }

    #[test]
    fn test_window_end_is_inclusive() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(limiter.check_at("c", start), RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check_at("c", start + Duration::from_secs(10)),
            RateLimitDecision::Deny { .. }
        ));
        assert_eq!(
            limiter.check_at("c", start + Duration::from_secs(10) + Duration::from_millis(1)),
            RateLimitDecision::Allow
        );
    }

    #[test]
    fn test_denied_requests_do_not_extend_count() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        limiter.check_at("c", start);
        limiter.check_at("c", start);
        for _ in 0..5 {
            assert!(matches!(limiter.check_at("c", start), RateLimitDecision::Deny { .. }));
        }
        let record = *limiter.records.get("c").unwrap();
        assert_eq!(record.count, 2);
    }

    #[test]
    fn test_boundary_allows_double_burst() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();

        // Opening request pins the window; the rest arrive just before it closes.
        let mut allowed = 0;
        if limiter.check_at("c", start) == RateLimitDecision::Allow {
            allowed += 1;
        }
        let before_boundary = start + Duration::from_secs(59);
        for _ in 0..9 {
            if limiter.check_at("c", before_boundary) == RateLimitDecision::Allow {
                allowed += 1;
            }
        }
        let after_boundary = start + Duration::from_secs(60) + Duration::from_millis(1);
        for _ in 0..10 {
            if limiter.check_at("c", after_boundary) == RateLimitDecision::Allow {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }

    #[test]
    fn test_clients_do_not_share_quota() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            limiter.check_at("a", now);
        }
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Deny { .. }));
        assert_eq!(limiter.check_at("b", now), RateLimitDecision::Allow);
    }

    #[test]
    fn test_each_request_counts_once() {
        let limiter = FixedWindowLimiter::new(100, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..50 {
            limiter.check_at("c", now);
        }
        assert_eq!(limiter.records.get("c").unwrap().count, 50);
        limiter.check_at("c", now);
        assert_eq!(limiter.records.get("c").unwrap().count, 51);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_quota() {
        let limiter = Arc::new(FixedWindowLimiter::new(100, Duration::from_secs(60)));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check_at("shared", now) == RateLimitDecision::Allow)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(8));
        assert_eq!(limiter.tracked_clients(), 2);

        let evicted = limiter.sweep_expired_at(start + Duration::from_secs(11));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.records.contains_key("new"));
    }

    #[test]
    fn test_client_id_falls_back_to_unknown() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_id(&request), UNKNOWN_CLIENT);

        let mut request = Request::builder().body(Body::empty()).unwrap();
        let addr: SocketAddr = "192.168.1.7:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_id(&request), "192.168.1.7");
    }

    #[test]
    fn test_client_id_uses_mock_connect_info() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        let mock: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        request.extensions_mut().insert(MockConnectInfo(mock));
        assert_eq!(client_id(&request), "10.1.2.3");

        // A real connection address wins over the mock.
        let peer: SocketAddr = "172.16.0.9:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_id(&request), "172.16.0.9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_records() {
        let limiter = Arc::new(FixedWindowLimiter::new(5, Duration::from_secs(1)));
        limiter.check("a");
        limiter.check("b");

        let shutdown = Shutdown::new();
        let handle = spawn_sweeper(limiter.clone(), Duration::from_secs(2), shutdown.subscribe());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
