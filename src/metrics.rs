use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    pub authors_created: Arc<AtomicUsize>,
    pub books_created: Arc<AtomicUsize>,
    pub records_deleted: Arc<AtomicUsize>,
    pub uploads_stored: Arc<AtomicU64>,
    pub upload_bytes: Arc<AtomicU64>,
    pub files_removed: Arc<AtomicU64>,
    pub searches: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            authors_created: Arc::new(AtomicUsize::new(0)),
            books_created: Arc::new(AtomicUsize::new(0)),
            records_deleted: Arc::new(AtomicUsize::new(0)),
            uploads_stored: Arc::new(AtomicU64::new(0)),
            upload_bytes: Arc::new(AtomicU64::new(0)),
            files_removed: Arc::new(AtomicU64::new(0)),
            searches: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_authors_created(&self) {
        self.authors_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_books_created(&self) {
        self.books_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_deleted(&self) {
        self.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_upload(&self, bytes: u64) {
        self.uploads_stored.fetch_add(1, Ordering::Relaxed);
        self.upload_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_files_removed(&self, count: u64) {
        self.files_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_searches(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            authors_created: self.authors_created.load(Ordering::Relaxed),
            books_created: self.books_created.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            uploads_stored: self.uploads_stored.load(Ordering::Relaxed),
            upload_bytes: self.upload_bytes.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub authors_created: usize,
    pub books_created: usize,
    pub records_deleted: usize,
    pub uploads_stored: u64,
    pub upload_bytes: u64,
    pub files_removed: u64,
    pub searches: usize,
    pub uptime_seconds: u64,
}
