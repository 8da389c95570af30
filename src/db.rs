use chrono::{SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Sqlite,
};

const POOL_SIZE: u32 = 16;

/// Tuning applied once per database. A failure is logged and ignored.
const TUNING_PRAGMAS: [&str; 3] = ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA busy_timeout=10000"];

const SCHEMA: [(&str, &str); 3] = [
    (
        "users",
        r#"CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )"#,
    ),
    (
        "authors",
        r#"CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            bio TEXT NOT NULL DEFAULT '',
            image TEXT NULL,
            name_fold TEXT NULL,
            bio_fold TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )"#,
    ),
    // An author with books cannot be deleted (RESTRICT)
    (
        "books",
        r#"CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            published_year INTEGER NULL,
            author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE RESTRICT,
            pdf TEXT NULL,
            cover_image TEXT NULL,
            title_fold TEXT NULL,
            description_fold TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )"#,
    ),
];

/// Lowercased copies of searchable text, added to databases created before
/// these columns existed.
const FOLD_COLUMNS: [(&str, &str); 4] = [
    ("authors", "name_fold"),
    ("authors", "bio_fold"),
    ("books", "title_fold"),
    ("books", "description_fold"),
];

const INDEXES: [(&str, &str); 4] = [
    ("idx_books_author", "books(author_id)"),
    ("idx_books_created", "books(created_at DESC)"),
    ("idx_books_year", "books(published_year)"),
    ("idx_books_title", "books(title)"),
];

/// Current UTC time in the text format stored in `created_at`/`updated_at`.
///
/// Matches the column default (`strftime('%Y-%m-%dT%H:%M:%fZ','now')`) so rows
/// written from SQL and from Rust sort the same way.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Text as stored in the `*_fold` columns and compared by search. SQLite's
/// `LIKE` only folds ASCII, so case folding happens here instead.
pub fn search_fold(text: &str) -> String {
    text.to_lowercase()
}

/// Creates the database file if needed and opens the server pool. Every
/// connection enforces foreign keys.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        tracing::info!("Creating SQLite database at {}", url);
        Sqlite::create_database(url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys=ON").execute(&mut *conn).await?;
                for pragma in ["PRAGMA busy_timeout=10000", "PRAGMA temp_store=MEMORY"] {
                    if let Err(e) = sqlx::query(pragma).execute(&mut *conn).await {
                        tracing::debug!("{} failed on new connection: {}", pragma, e);
                    }
                }
                Ok(())
            })
        })
        .connect(url)
        .await?;
    Ok(pool)
}

/// Applies pragmas, then creates tables and indexes that do not exist yet.
pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    for pragma in TUNING_PRAGMAS {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            tracing::warn!("{} failed: {}", pragma, e);
        }
    }
    // books.author_id relies on this
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    for (table, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("creating table {}: {}", table, e))?;
    }

    for (table, column) in FOLD_COLUMNS {
        let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
        if present == 0 {
            tracing::info!("Adding column {}.{}", table, column);
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} TEXT NULL", table, column)).execute(pool).await?;
        }
    }
    backfill_folds(pool).await?;

    for (name, target) in INDEXES {
        let ddl = format!("CREATE INDEX IF NOT EXISTS {} ON {}", name, target);
        if let Err(e) = sqlx::query(&ddl).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}

/// Fills `*_fold` columns left empty by rows written without them.
async fn backfill_folds(pool: &SqlitePool) -> anyhow::Result<()> {
    let authors: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, name, bio FROM authors WHERE name_fold IS NULL OR bio_fold IS NULL")
            .fetch_all(pool)
            .await?;
    for (id, name, bio) in &authors {
        sqlx::query("UPDATE authors SET name_fold = ?1, bio_fold = ?2 WHERE id = ?3")
            .bind(search_fold(name))
            .bind(search_fold(bio))
            .bind(id)
            .execute(pool)
            .await?;
    }

    let books: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, title, description FROM books WHERE title_fold IS NULL OR description_fold IS NULL")
            .fetch_all(pool)
            .await?;
    for (id, title, description) in &books {
        sqlx::query("UPDATE books SET title_fold = ?1, description_fold = ?2 WHERE id = ?3")
            .bind(search_fold(title))
            .bind(search_fold(description))
            .bind(id)
            .execute(pool)
            .await?;
    }

    if !authors.is_empty() || !books.is_empty() {
        tracing::info!("Backfilled search columns for {} authors and {} books", authors.len(), books.len());
    }
    Ok(())
}
