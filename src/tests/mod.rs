//! Integration and unit tests for the bookclub backend.
//!
//! ## Test Modules
//!
//! - **support**: shared fixtures (in-memory database, temp upload dir, request builders)
//! - **api_tests**: authors, books and users endpoints
//! - **bookclub_api_tests**: carousel, recommendations, search, browse and dashboard
//! - **error_tests**: error mapping and the JSON error envelope
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: schema and constraints
//! - **health_api_tests**: health, metrics and version endpoints
//!
//! Run a single module with e.g. `cargo test api_tests`.

pub mod support;

pub mod bookclub_api_tests;
pub mod config_tests;
