use axum::{extract::State, Json};
use rand::seq::SliceRandom;
use serde::Deserialize;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::{
    db::search_fold,
    error::{validation::page_params, AppError, AppResult},
    middleware::{ip::ClientIp, validation::sanitize_for_logging},
    routes::{
        book_rows::{books_with_authors, BOOK_WITH_AUTHOR_SELECT},
        query::ApiQuery,
    },
    state::AppState,
    types::{
        BookSort, BookWithAuthor, BrowseFilters, BrowseResponse, FeaturedBooks, HitKind, PageQuery, SearchHit,
        SearchResponse, SearchType,
    },
};

const FEATURED_COUNT: usize = 6;
const MIN_QUERY_CHARS: usize = 2;
const MAX_QUERY_CHARS: usize = 200;
const DEFAULT_SEARCH_LIMIT: i64 = 10;
const LIKE_ESCAPE: char = '!';

fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like_pattern(value))
}

/// The 6 most recently added books that have a cover.
pub async fn carousel(State(state): State<AppState>) -> AppResult<Json<FeaturedBooks>> {
    let sql = format!(
        "{} WHERE b.cover_image IS NOT NULL ORDER BY b.created_at DESC, b.id DESC LIMIT ?1",
        BOOK_WITH_AUTHOR_SELECT
    );
    let rows = sqlx::query(&sql).bind(FEATURED_COUNT as i64).fetch_all(&state.db).await?;
    let data = books_with_authors(&rows)?;

    let message = if data.is_empty() {
        "No books with cover images found".to_string()
    } else {
        format!("Found {} books with cover images", data.len())
    };
    Ok(Json(FeaturedBooks { success: true, count: data.len(), data, message }))
}

/// Uniform random sample of up to `n` books, drawn per call.
fn pick_random(mut books: Vec<BookWithAuthor>, n: usize) -> Vec<BookWithAuthor> {
    books.shuffle(&mut rand::thread_rng());
    books.truncate(n);
    books
}

/// Up to 6 books with a cover, chosen at random on every request.
pub async fn recommended(State(state): State<AppState>) -> AppResult<Json<FeaturedBooks>> {
    let sql = format!("{} WHERE b.cover_image IS NOT NULL", BOOK_WITH_AUTHOR_SELECT);
    let rows = sqlx::query(&sql).fetch_all(&state.db).await?;
    let data = pick_random(books_with_authors(&rows)?, FEATURED_COUNT);

    let message = format!("Found {} recommended books", data.len());
    Ok(Json(FeaturedBooks { success: true, count: data.len(), data, message }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default, rename = "type")]
    pub search_type: SearchType,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn sanitize_search_term(raw: Option<&str>) -> AppResult<String> {
    let trimmed = raw.unwrap_or_default().trim();
    let sanitized: String = trimmed.chars().filter(|ch| !ch.is_control() || ch.is_whitespace()).collect();
    let chars = sanitized.chars().count();
    if chars < MIN_QUERY_CHARS {
        return Err(AppError::BadRequest(format!(
            "Search query must be at least {} characters long",
            MIN_QUERY_CHARS
        )));
    }
    if chars > MAX_QUERY_CHARS {
        return Err(AppError::InvalidInput("Search query too long".to_string()));
    }
    Ok(sanitized)
}

/// Moves hits whose title contains `query` (case-insensitive) to the front.
/// The sort is stable, so ties keep their database order.
pub fn rank_hits(hits: &mut [SearchHit], query: &str) {
    let needle = search_fold(query);
    hits.sort_by_key(|hit| !search_fold(&hit.title).contains(&needle));
}

pub async fn search(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    state.rate_limiter.check_endpoint_limit("/bookclub/search", ip).await?;

    let term = sanitize_search_term(query.q.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=state.config.pagination.max_limit).contains(&limit) {
        return Err(AppError::ValidationError {
            field: "limit".to_string(),
            message: format!("Value must be in 1..={}, got {}", state.config.pagination.max_limit, limit),
        });
    }
    let pattern = contains_pattern(&search_fold(&term));
    let search_type = query.search_type;

    let books = async {
        if !search_type.includes_books() {
            return Ok(Vec::new());
        }
        sqlx::query(
            r#"SELECT b.id, b.title, b.description, b.cover_image, b.published_year, a.name AS author_name
               FROM books b JOIN authors a ON a.id = b.author_id
               WHERE b.title_fold LIKE ?1 ESCAPE '!' OR b.description_fold LIKE ?1 ESCAPE '!'
               ORDER BY b.id ASC
               LIMIT ?2"#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&state.db)
        .await
    };
    let authors = async {
        if !search_type.includes_authors() {
            return Ok(Vec::new());
        }
        sqlx::query(
            r#"SELECT id, name, bio, image FROM authors
               WHERE name_fold LIKE ?1 ESCAPE '!' OR bio_fold LIKE ?1 ESCAPE '!'
               ORDER BY id ASC
               LIMIT ?2"#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&state.db)
        .await
    };
    let (book_rows, author_rows) = tokio::try_join!(books, authors)?;

    let mut hits = Vec::with_capacity(book_rows.len() + author_rows.len());
    for row in book_rows {
        hits.push(SearchHit {
            kind: HitKind::Book,
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author_name")?,
            description: row.try_get("description")?,
            cover_image: row.try_get("cover_image")?,
            published_year: row.try_get("published_year")?,
            category: "Book".to_string(),
        });
    }
    for row in author_rows {
        let name: String = row.try_get("name")?;
        hits.push(SearchHit {
            kind: HitKind::Author,
            id: row.try_get("id")?,
            title: name.clone(),
            author: name,
            description: row.try_get("bio")?,
            cover_image: row.try_get("image")?,
            published_year: None,
            category: "Author".to_string(),
        });
    }

    rank_hits(&mut hits, &term);
    let count = hits.len();
    hits.truncate(limit as usize);

    state.metrics.inc_searches();
    tracing::debug!(query = %sanitize_for_logging(&term), count, "Search");
    Ok(Json(SearchResponse { success: true, data: hits, count, query: term, search_type }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub author: Option<String>,
    pub year: Option<String>,
    pub sort: Option<String>,
}

/// Filters after parsing; `None` means "all".
#[derive(Debug, Default, Clone, PartialEq)]
struct BrowseFilterSet {
    search: Option<String>,
    author_id: Option<i64>,
    year: Option<i64>,
}

/// `"all"`, empty or missing mean no filter; anything else must be an integer.
fn parse_all_or_int(raw: Option<&str>, field: &str) -> AppResult<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => v.parse::<i64>().map(Some).map_err(|_| AppError::ValidationError {
            field: field.to_string(),
            message: format!("Expected an integer or 'all', got '{}'", v),
        }),
    }
}

impl BrowseFilterSet {
    fn from_query(query: &BrowseQuery) -> AppResult<Self> {
        Ok(Self {
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| contains_pattern(&search_fold(s))),
            author_id: parse_all_or_int(query.author.as_deref(), "author")?,
            year: parse_all_or_int(query.year.as_deref(), "year")?,
        })
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(pattern) = &self.search {
            qb.push(" AND (b.title_fold LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '!' OR b.description_fold LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '!' OR a.name_fold LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '!')");
        }
        if let Some(author_id) = self.author_id {
            qb.push(" AND b.author_id = ").push_bind(author_id);
        }
        if let Some(year) = self.year {
            qb.push(" AND b.published_year = ").push_bind(year);
        }
    }
}

/// Filtered, sorted and paginated book browser.
pub async fn books_by_author(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BrowseQuery>,
) -> AppResult<Json<BrowseResponse>> {
    let page_query = PageQuery { page: query.page, limit: query.limit };
    let params =
        page_params(&page_query, state.config.pagination.default_limit, state.config.pagination.max_limit)?;
    let filters = BrowseFilterSet::from_query(&query)?;
    let sort = BookSort::from_param(query.sort.as_deref());

    let mut count_qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM books b JOIN authors a ON a.id = b.author_id");
    filters.push_where(&mut count_qb);

    let mut select_qb: QueryBuilder<Sqlite> = QueryBuilder::new(BOOK_WITH_AUTHOR_SELECT);
    filters.push_where(&mut select_qb);
    select_qb
        .push(" ORDER BY ")
        .push(sort.order_by())
        .push(" LIMIT ")
        .push_bind(params.limit)
        .push(" OFFSET ")
        .push_bind(params.offset());

    let (total_books, rows) = tokio::try_join!(
        count_qb.build_query_scalar::<i64>().fetch_one(&state.db),
        select_qb.build().fetch_all(&state.db),
    )?;

    Ok(Json(BrowseResponse {
        page: params.page,
        limit: params.limit,
        total_books,
        total_pages: params.total_pages(total_books),
        data: books_with_authors(&rows)?,
        filters: BrowseFilters { search: query.search, author_id: query.author, year: query.year, sort },
    }))
}
