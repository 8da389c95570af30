use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{config::AppConfig, db, routes, state::AppState};

pub const BOUNDARY: &str = "----bookclub-test-boundary";

/// A router over an in-memory database with uploads in a temp dir.
/// Keep `uploads` alive for as long as the test touches files.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub uploads: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    // One connection that never expires, so the in-memory database survives
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<std::time::Duration>)
        .max_lifetime(None::<std::time::Duration>)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_db(&pool).await.unwrap();

    let uploads = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.uploads.dir = uploads.path().to_string_lossy().into_owned();
    adjust(&mut config);

    let state = AppState::new(pool, config);
    let app = routes::router(state.clone());
    TestApp { app, state, uploads }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method(Method::DELETE).uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        fields: &[(&str, &str)],
        files: &[FilePart<'_>],
    ) -> (StatusCode, Value) {
        self.send(multipart_request(method, uri, fields, files)).await
    }

    /// Path on disk for a public `/uploads/...` path.
    pub fn upload_path(&self, public: &str) -> std::path::PathBuf {
        self.state.uploads.resolve(public).unwrap()
    }

    pub async fn seed_author(&self, name: &str, bio: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO authors (name, bio, name_fold, bio_fold) VALUES (?1, ?2, ?3, ?4) RETURNING id",
        )
        .bind(name)
        .bind(bio)
        .bind(db::search_fold(name))
        .bind(db::search_fold(bio))
        .fetch_one(&self.state.db)
        .await
        .unwrap()
    }

    /// Inserts a book; `seq` sets `created_at` so insertion order is explicit.
    pub async fn seed_book(&self, book: SeedBook<'_>) -> i64 {
        let created_at = format!("2024-01-01T00:00:{:02}.000Z", book.seq);
        sqlx::query_scalar(
            r#"INSERT INTO books (title, description, published_year, author_id, pdf, cover_image,
                                  title_fold, description_fold, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) RETURNING id"#,
        )
        .bind(book.title)
        .bind(book.description)
        .bind(book.year)
        .bind(book.author_id)
        .bind(book.pdf)
        .bind(book.cover)
        .bind(db::search_fold(book.title))
        .bind(db::search_fold(book.description))
        .bind(created_at)
        .fetch_one(&self.state.db)
        .await
        .unwrap()
    }
}

#[derive(Default, Clone, Copy)]
pub struct SeedBook<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub author_id: i64,
    pub year: Option<i64>,
    pub cover: Option<&'a str>,
    pub pdf: Option<&'a str>,
    pub seq: u32,
}

pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub fn multipart_request(method: Method, uri: &str, fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}
