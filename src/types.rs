use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Rows as persisted. Column names are snake_case, the wire format is camelCase.

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub bio: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub published_year: Option<i64>,
    pub author_id: i64,
    pub pdf: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A book together with the author it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookWithAuthor {
    #[serde(flatten)]
    pub book: Book,
    pub author: Author,
}

// ---------------- Request bodies ----------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Author fields accepted by create and update, from JSON or multipart text parts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorInput {
    pub name: Option<String>,
    pub bio: Option<String>,
}

/// Book fields accepted by create and update.
///
/// `pdf` and `cover_image` are only read from JSON bodies, where the client
/// references files that already sit under `/uploads/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i64>,
    pub author_id: Option<i64>,
    pub pdf: Option<String>,
    pub cover_image: Option<String>,
}

// ---------------- Pagination ----------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated `page`/`limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// `ceil(total / limit)`, zero when there is nothing to page through.
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorPage {
    pub page: i64,
    pub limit: i64,
    pub total_authors: i64,
    pub total_pages: i64,
    pub data: Vec<Author>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPage {
    pub page: i64,
    pub limit: i64,
    pub total_books: i64,
    pub total_pages: i64,
    pub data: Vec<BookWithAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// ---------------- Dashboard ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_books: i64,
    pub total_authors: i64,
    pub books_this_year: i64,
    pub library_collection: i64,
    pub last_updated: String,
}

// ---------------- Bookclub ----------------

/// Envelope used by the carousel and recommendation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedBooks {
    pub success: bool,
    pub data: Vec<BookWithAuthor>,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    All,
    Book,
    Author,
}

impl SearchType {
    pub fn includes_books(self) -> bool {
        matches!(self, SearchType::All | SearchType::Book)
    }

    pub fn includes_authors(self) -> bool {
        matches!(self, SearchType::All | SearchType::Author)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Book,
    Author,
}

/// One search result. Authors reuse the book-shaped fields: `title` and
/// `author` hold the author's name, `coverImage` the portrait.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: HitKind,
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<SearchHit>,
    pub count: usize,
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: SearchType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    #[default]
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
}

impl BookSort {
    /// Reads the `sort` query value; missing or unknown values sort newest first.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("oldest") => BookSort::Oldest,
            Some("title_asc") => BookSort::TitleAsc,
            Some("title_desc") => BookSort::TitleDesc,
            _ => BookSort::Newest,
        }
    }

    pub fn order_by(self) -> &'static str {
        match self {
            BookSort::Newest => "b.created_at DESC, b.id DESC",
            BookSort::Oldest => "b.created_at ASC, b.id ASC",
            BookSort::TitleAsc => "b.title COLLATE NOCASE ASC, b.id ASC",
            BookSort::TitleDesc => "b.title COLLATE NOCASE DESC, b.id DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseFilters {
    pub search: Option<String>,
    pub author_id: Option<String>,
    pub year: Option<String>,
    pub sort: BookSort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub page: i64,
    pub limit: i64,
    pub total_books: i64,
    pub total_pages: i64,
    pub data: Vec<BookWithAuthor>,
    pub filters: BrowseFilters,
}
