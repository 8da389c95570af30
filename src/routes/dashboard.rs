use axum::{extract::State, Json};
use chrono::{Datelike, SecondsFormat, Utc};

use crate::{error::AppResult, state::AppState, types::DashboardStats};

/// Library counters for the admin dashboard. The three counts run concurrently.
///
/// `libraryCollection` is books plus authors: the number of catalogue entries
/// the dashboard shows, not a separately stored figure.
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<DashboardStats>> {
    let now = Utc::now();
    let current_year = i64::from(now.year());

    let (total_books, total_authors, books_this_year) = tokio::try_join!(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books").fetch_one(&state.db),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM authors").fetch_one(&state.db),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE published_year = ?1")
            .bind(current_year)
            .fetch_one(&state.db),
    )?;

    Ok(Json(DashboardStats {
        total_books,
        total_authors,
        books_this_year,
        library_collection: total_books + total_authors,
        last_updated: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}
