// Shared SQL for reading books joined with their author.

use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};

use crate::types::{Author, Book, BookWithAuthor};

/// `books b JOIN authors a`; author columns are prefixed `a_` to avoid clashing
/// with the book's own `id`/`created_at`/`updated_at`.
pub const BOOK_WITH_AUTHOR_SELECT: &str = "SELECT b.id, b.title, b.description, b.published_year, b.author_id, \
     b.pdf, b.cover_image, b.created_at, b.updated_at, \
     a.id AS a_id, a.name AS a_name, a.bio AS a_bio, a.image AS a_image, \
     a.created_at AS a_created_at, a.updated_at AS a_updated_at \
     FROM books b JOIN authors a ON a.id = b.author_id";

pub fn book_with_author(row: &SqliteRow) -> Result<BookWithAuthor, sqlx::Error> {
    let book = Book::from_row(row)?;
    let author = Author {
        id: row.try_get("a_id")?,
        name: row.try_get("a_name")?,
        bio: row.try_get("a_bio")?,
        image: row.try_get("a_image")?,
        created_at: row.try_get("a_created_at")?,
        updated_at: row.try_get("a_updated_at")?,
    };
    Ok(BookWithAuthor { book, author })
}

pub fn books_with_authors(rows: &[SqliteRow]) -> Result<Vec<BookWithAuthor>, sqlx::Error> {
    rows.iter().map(book_with_author).collect()
}

pub async fn fetch_book_with_author(db: &SqlitePool, id: i64) -> Result<Option<BookWithAuthor>, sqlx::Error> {
    let sql = format!("{} WHERE b.id = ?1", BOOK_WITH_AUTHOR_SELECT);
    let row = sqlx::query(&sql).bind(id).fetch_optional(db).await?;
    row.as_ref().map(book_with_author).transpose()
}

pub async fn fetch_book(db: &SqlitePool, id: i64) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?1").bind(id).fetch_optional(db).await
}
