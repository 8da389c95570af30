//! Per-IP request budgets.
//!
//! One global limiter guards every route; [`EndpointRateLimiter`] adds tighter
//! budgets that handlers check for uploads and search.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use axum::{
    extract::{connect_info::ConnectInfo, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;

use super::ip::extract_ip_from_headers;
use crate::error::AppError;

const GLOBAL_MAX_REQUESTS: usize = 1000;
const GLOBAL_WINDOW_SECONDS: u64 = 60;
const GLOBAL_CLEANUP_EVERY: Duration = Duration::from_secs(600);

/// Sliding-window log: each IP keeps the instants of its requests inside the
/// current window, oldest first.
#[derive(Clone)]
pub struct RateLimiter {
    log: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self { log: Arc::new(Mutex::new(HashMap::new())), max_requests, window: Duration::from_secs(window_seconds) }
    }

    fn expire(&self, entries: &mut VecDeque<Instant>, now: Instant) {
        // An instant from the future (clock skew) counts as fresh
        while let Some(&oldest) = entries.front() {
            match now.checked_duration_since(oldest) {
                Some(age) if age >= self.window => {
                    entries.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Counts one request from `ip`, or fails with the seconds until a slot frees up.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut log = self.log.lock().await;
        let entries = log.entry(ip).or_default();
        self.expire(entries, now);

        if entries.len() < self.max_requests {
            entries.push_back(now);
            return Ok(());
        }

        let wait = entries
            .front()
            .and_then(|&oldest| now.checked_duration_since(oldest))
            .map(|age| self.window.saturating_sub(age))
            .unwrap_or(Duration::from_secs(1));
        Err(AppError::RateLimited { retry_after_seconds: wait.as_secs().max(1) })
    }

    /// Forgets IPs whose requests have all left the window.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut log = self.log.lock().await;
        log.retain(|_, entries| {
            self.expire(entries, now);
            !entries.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_ips(&self) -> usize {
        self.log.lock().await.len()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

lazy_static::lazy_static! {
    static ref GLOBAL_RATE_LIMITER: RateLimiter = RateLimiter::new(
        env_or("BOOKCLUB_RATE_LIMIT_MAX_REQUESTS", GLOBAL_MAX_REQUESTS),
        env_or("BOOKCLUB_RATE_LIMIT_WINDOW_SECONDS", GLOBAL_WINDOW_SECONDS),
    );
}

static GLOBAL_CLEANUP: Once = Once::new();

/// Global per-IP limit for every request.
///
/// `BOOKCLUB_RATE_LIMIT_MAX_REQUESTS` / `BOOKCLUB_RATE_LIMIT_WINDOW_SECONDS`
/// override the 1000 per 60 s default; they are read once.
pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    GLOBAL_CLEANUP.call_once(|| {
        let limiter = GLOBAL_RATE_LIMITER.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GLOBAL_CLEANUP_EVERY);
            loop {
                ticker.tick().await;
                limiter.cleanup_old_entries().await;
            }
        });
    });

    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip());
    let ip = extract_ip_from_headers(req.headers(), peer);

    if let Err(err) = GLOBAL_RATE_LIMITER.check_rate_limit(ip).await {
        tracing::debug!(%ip, "Global rate limit hit");
        return err.into_response();
    }
    next.run(req).await
}

/// Extra budgets for named endpoints. The set of endpoints is fixed at
/// construction; unknown names are never limited.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<&'static str, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `(endpoint, max_requests, window_seconds)` budgets; a repeated
    /// endpoint replaces the earlier one.
    pub fn with_limits(self, limits: Vec<(&'static str, usize, u64)>) -> Self {
        let mut limiters: HashMap<_, _> = self.limiters.iter().map(|(k, v)| (*k, v.clone())).collect();
        for (endpoint, max_requests, window_seconds) in limits {
            limiters.insert(endpoint, RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(limiters) }
    }

    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), AppError> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}
