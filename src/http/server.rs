//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the path guard and download limiter once, at startup
//! - Create the Axum router: health endpoint plus the guarded file service
//! - Wire up middleware (request ID, tracing, timeout, concurrency limit)
//! - Run the rate-limit sweeper alongside the server
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::response::health;
use crate::lifecycle::Shutdown;
use crate::security::{
    download_limit_middleware, file_access_middleware, spawn_sweeper, DownloadLimiter,
    FixedWindowLimiter, PathGuard,
};

/// HTTP server for uploaded lecture resources.
pub struct HttpServer {
    config: GuardConfig,
    path_guard: Arc<PathGuard>,
    limiter: Option<Arc<dyn DownloadLimiter>>,
}

impl HttpServer {
    /// Create a new server. Fails if the upload root cannot be resolved.
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        let path_guard = Arc::new(PathGuard::new(
            &config.uploads.root_dir,
            config.uploads.strict_containment,
        )?);

        let limiter = config.rate_limit.enabled.then(|| {
            Arc::new(FixedWindowLimiter::new(
                config.rate_limit.max_downloads,
                config.rate_limit.window(),
            )) as Arc<dyn DownloadLimiter>
        });

        tracing::info!(
            upload_root = %path_guard.root().display(),
            mount_path = %config.uploads.mount_path,
            rate_limit_enabled = config.rate_limit.enabled,
            max_downloads = config.rate_limit.max_downloads,
            window_ms = config.rate_limit.window_ms,
            "File guards initialized"
        );

        Ok(Self {
            config,
            path_guard,
            limiter,
        })
    }

    /// Replace the download limiter, e.g. with one backed by a shared store.
    pub fn with_limiter(mut self, limiter: Arc<dyn DownloadLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        // Layers added later wrap earlier ones: the path guard runs first.
        let mut files = Router::new().fallback_service(ServeDir::new(self.path_guard.root()));
        if let Some(limiter) = &self.limiter {
            files = files.layer(middleware::from_fn_with_state(
                limiter.clone(),
                download_limit_middleware,
            ));
        }
        let files = files.layer(middleware::from_fn_with_state(
            self.path_guard.clone(),
            file_access_middleware,
        ));

        Router::new()
            .route("/health", get(health))
            .nest_service(&self.config.uploads.mount_path, files)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.timeouts.request_secs,
                    )))
                    .layer(GlobalConcurrencyLimitLayer::new(
                        self.config.listener.max_concurrent_requests,
                    )),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper_shutdown = Shutdown::new();
        let sweeper = match (&self.limiter, self.config.rate_limit.sweep_interval()) {
            (Some(limiter), Some(every)) => Some(spawn_sweeper(
                limiter.clone(),
                every,
                sweeper_shutdown.subscribe(),
            )),
            _ => None,
        };

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;

        sweeper_shutdown.trigger();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Rate limiter sweeper failed");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn path_guard(&self) -> &Arc<PathGuard> {
        &self.path_guard
    }

    pub fn limiter(&self) -> Option<&Arc<dyn DownloadLimiter>> {
        self.limiter.as_ref()
    }
}
