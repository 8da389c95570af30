use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::storage::UploadStore;

/// The shared application state.
///
/// Cloned into every handler by axum's `State` extractor; all fields are
/// cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// The application metrics.
    pub metrics: Metrics,
    /// Disk storage behind `/uploads`.
    pub uploads: UploadStore,
    /// The per-endpoint rate limiter.
    ///
    /// Uploading writes and search are limited tighter than the global
    /// per-IP budget.
    pub rate_limiter: EndpointRateLimiter,
}

impl AppState {
    /// Creates the state with default endpoint limits:
    /// - 60 author/book creations per minute
    /// - 300 searches per minute
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("POST /authors", 60, 60),
            ("POST /books", 60, 60),
            ("/bookclub/search", 300, 60),
        ]);
        let uploads = UploadStore::new(config.uploads.dir.clone());

        Self { db, config: Arc::new(config), metrics: Metrics::new(), uploads, rate_limiter }
    }
}
