//! # Bookclub Backend Library
//!
//! REST backend for a small library: authors, books with PDF and cover
//! uploads, reader-facing discovery endpoints and dashboard statistics.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server, routing and multipart handling
//! - **SQLx**: asynchronous SQLite access
//! - **Tokio**: async runtime and file I/O for uploads
//! - **Serde**: JSON request and response bodies
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, file, environment)
//! - [`db`]: schema initialization
//! - [`error`]: error taxonomy and the JSON error envelope
//! - [`metrics`]: process counters
//! - [`middleware`]: security headers, rate limiting, request validation
//! - [`routes`]: endpoint handlers and the router
//! - [`state`]: shared application state
//! - [`storage`]: upload storage on disk
//! - [`types`]: records and DTOs

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;
