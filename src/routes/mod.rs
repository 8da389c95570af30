//! HTTP route handlers for the bookclub API.
//!
//! Each sub-module handles one area of the API:
//!
//! - `authors`: author CRUD, paginated listing and an author's books
//! - `books`: book CRUD with PDF and cover uploads
//! - `bookclub`: reader-facing carousel, recommendations, search and browse
//! - `dashboard`: library counters for the admin dashboard
//! - `users`: plain JSON user records
//! - `health`: liveness, readiness, metrics and build info
//! - `forms` / `book_rows`: shared request-body and row-mapping helpers
//!
//! [`router`] wires everything together with the middleware stack.

pub mod authors;
pub mod book_rows;
pub mod bookclub;
pub mod books;
pub mod dashboard;
pub mod forms;
pub mod health;
pub mod query;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{config::CorsConfig, error::AppError, middleware, state::AppState};

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    if cfg.allows_any_origin() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Builds the complete application: API routes, the `/uploads` file service
/// and the middleware stack.
pub fn router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let uploads_dir = ServeDir::new(state.uploads.root());

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", get(users::get_user).put(users::update_user).delete(users::delete_user))
        .route("/authors", get(authors::list_authors).post(authors::create_author))
        .route("/authors/list", get(authors::all_authors))
        .route(
            "/authors/{id}",
            get(authors::get_author).put(authors::update_author).delete(authors::delete_author),
        )
        .route("/authors/{id}/books", get(authors::author_books))
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/list", get(books::all_books))
        .route("/books/{id}", get(books::get_book).put(books::update_book).delete(books::delete_book))
        .route("/bookclub/carousel", get(bookclub::carousel))
        .route("/bookclub/recommended", get(bookclub::recommended))
        .route("/bookclub/search", get(bookclub::search))
        .route("/bookclub/booksbyauthor", get(bookclub::books_by_author))
        .route("/dashboard/stats", get(dashboard::stats))
        .nest_service("/uploads", uploads_dir)
        .fallback(route_not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(cfg.uploads.max_body_bytes))
        .layer(from_fn_with_state(cfg.clone(), middleware::validation::validate_request_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg.clone(), middleware::security_headers::security_headers_middleware))
        .layer(cors_layer(&cfg.cors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_lists_and_wildcard() {
        let _ = cors_layer(&CorsConfig { allowed_origins: vec!["*".to_string()] });
        let _ = cors_layer(&CorsConfig {
            allowed_origins: vec!["http://localhost:5173".to_string(), "bad\norigin".to_string()],
        });
    }
}
