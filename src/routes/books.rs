use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    db::{now_timestamp, search_fold},
    error::{
        validation::{non_empty, page_params, parse_id},
        AppError, AppResult, OptionExt,
    },
    middleware::ip::ClientIp,
    routes::{
        book_rows::{books_with_authors, fetch_book, fetch_book_with_author, BOOK_WITH_AUTHOR_SELECT},
        forms::{remove_uploads, store_upload, FormData, Submission},
        query::ApiQuery,
    },
    state::AppState,
    storage::{validate_slot_path, UploadSlot},
    types::{BookInput, BookPage, BookWithAuthor, MessageResponse, PageQuery},
};

/// Book fields after reading the body. `pdf`/`cover_image` hold either freshly
/// stored uploads (listed in `new_files`) or validated paths from a JSON body.
struct BookSubmission {
    input: BookInput,
    new_files: Vec<String>,
}

async fn read_submission(state: &AppState, submission: Submission<BookInput>) -> AppResult<BookSubmission> {
    match submission {
        Submission::Json(mut input) => {
            input.pdf = non_empty(input.pdf);
            input.cover_image = non_empty(input.cover_image);
            let slots = [(&input.pdf, UploadSlot::BookPdf), (&input.cover_image, UploadSlot::BookCover)];
            for (path, slot) in slots {
                if let Some(path) = path {
                    validate_slot_path(path, slot)?;
                }
            }
            Ok(BookSubmission { input, new_files: Vec::new() })
        }
        Submission::Form(multipart) => {
            let mut form = FormData::read(multipart).await?;
            let mut input = BookInput {
                title: form.text("title"),
                description: form.text("description"),
                published_year: form.int("publishedYear")?,
                author_id: form.int("authorId")?,
                pdf: None,
                cover_image: None,
            };

            let mut new_files = Vec::new();
            let slots = [("pdf", UploadSlot::BookPdf), ("coverImage", UploadSlot::BookCover)];
            for (field, slot) in slots {
                let Some(file) = form.take_file(field) else { continue };
                match store_upload(state, slot, &file).await {
                    Ok(path) => {
                        new_files.push(path.clone());
                        match slot {
                            UploadSlot::BookPdf => input.pdf = Some(path),
                            _ => input.cover_image = Some(path),
                        }
                    }
                    Err(e) => {
                        remove_uploads(state, &new_files).await;
                        return Err(e);
                    }
                }
            }
            Ok(BookSubmission { input, new_files })
        }
    }
}

fn author_conflict(author_id: Option<i64>) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match AppError::from(e) {
        AppError::Conflict(_) => match author_id {
            Some(id) => AppError::Conflict(format!("Author {} does not exist", id)),
            None => AppError::Conflict("Referenced author does not exist".to_string()),
        },
        other => other,
    }
}

pub async fn list_books(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<BookPage>> {
    let params = page_params(&query, state.config.pagination.default_limit, state.config.pagination.max_limit)?;

    let sql = format!("{} ORDER BY b.id ASC LIMIT ?1 OFFSET ?2", BOOK_WITH_AUTHOR_SELECT);
    let (total_books, rows) = tokio::try_join!(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books").fetch_one(&state.db),
        sqlx::query(&sql).bind(params.limit).bind(params.offset()).fetch_all(&state.db),
    )?;

    Ok(Json(BookPage {
        page: params.page,
        limit: params.limit,
        total_books,
        total_pages: params.total_pages(total_books),
        data: books_with_authors(&rows)?,
    }))
}

pub async fn all_books(State(state): State<AppState>) -> AppResult<Json<Vec<BookWithAuthor>>> {
    let sql = format!("{} ORDER BY b.id ASC", BOOK_WITH_AUTHOR_SELECT);
    let rows = sqlx::query(&sql).fetch_all(&state.db).await?;
    Ok(Json(books_with_authors(&rows)?))
}

pub async fn get_book(State(state): State<AppState>, Path(raw_id): Path<String>) -> AppResult<Json<BookWithAuthor>> {
    let id = parse_id(&raw_id, "book")?;
    let book = fetch_book_with_author(&state.db, id).await?.ok_or_not_found("Book")?;
    Ok(Json(book))
}

pub async fn create_book(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    submission: Submission<BookInput>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit("POST /books", ip).await?;

    let BookSubmission { input, new_files } = read_submission(&state, submission).await?;

    let (Some(title), Some(author_id)) = (non_empty(input.title), input.author_id) else {
        remove_uploads(&state, &new_files).await;
        return Err(AppError::BadRequest("Title and authorId required".to_string()));
    };
    let description = input.description.map(|d| d.trim().to_string()).unwrap_or_default();

    let now = now_timestamp();
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO books (title, description, published_year, author_id, pdf, cover_image,
                              title_fold, description_fold, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
           RETURNING id"#,
    )
    .bind(&title)
    .bind(&description)
    .bind(input.published_year)
    .bind(author_id)
    .bind(&input.pdf)
    .bind(&input.cover_image)
    .bind(search_fold(&title))
    .bind(search_fold(&description))
    .bind(&now)
    .fetch_one(&state.db)
    .await
    .map_err(author_conflict(Some(author_id)));

    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            remove_uploads(&state, &new_files).await;
            return Err(e);
        }
    };

    let book = fetch_book_with_author(&state.db, id).await?.ok_or_not_found("Book")?;
    state.metrics.inc_books_created();
    tracing::info!(book_id = id, author_id, "Book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Partial update. A new `pdf`/`coverImage` replaces the old file once the
/// row is updated; if the update fails the new files are removed instead.
pub async fn update_book(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    submission: Submission<BookInput>,
) -> AppResult<Json<BookWithAuthor>> {
    let id = parse_id(&raw_id, "book")?;
    let existing = fetch_book(&state.db, id).await?.ok_or_not_found("Book")?;

    let BookSubmission { input, new_files } = read_submission(&state, submission).await?;
    let title = non_empty(input.title);
    let description = input.description.map(|d| d.trim().to_string());

    let updated = sqlx::query(
        r#"UPDATE books
           SET title = COALESCE(?1, title),
               description = COALESCE(?2, description),
               published_year = COALESCE(?3, published_year),
               author_id = COALESCE(?4, author_id),
               pdf = COALESCE(?5, pdf),
               cover_image = COALESCE(?6, cover_image),
               title_fold = COALESCE(?7, title_fold),
               description_fold = COALESCE(?8, description_fold),
               updated_at = ?9
           WHERE id = ?10"#,
    )
    .bind(&title)
    .bind(&description)
    .bind(input.published_year)
    .bind(input.author_id)
    .bind(&input.pdf)
    .bind(&input.cover_image)
    .bind(title.as_deref().map(search_fold))
    .bind(description.as_deref().map(search_fold))
    .bind(now_timestamp())
    .bind(id)
    .execute(&state.db)
    .await
    .map_err(author_conflict(input.author_id));

    match updated {
        Ok(result) if result.rows_affected() > 0 => {}
        Ok(_) => {
            remove_uploads(&state, &new_files).await;
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        Err(e) => {
            remove_uploads(&state, &new_files).await;
            return Err(e);
        }
    }

    let mut replaced = Vec::new();
    if let (Some(old), Some(new)) = (&existing.pdf, &input.pdf) {
        if old != new {
            replaced.push(old.clone());
        }
    }
    if let (Some(old), Some(new)) = (&existing.cover_image, &input.cover_image) {
        if old != new {
            replaced.push(old.clone());
        }
    }
    remove_uploads(&state, &replaced).await;

    let book = fetch_book_with_author(&state.db, id).await?.ok_or_not_found("Book")?;
    tracing::info!(book_id = id, "Book updated");
    Ok(Json(book))
}

/// Deletes the row, then its files. A missing file never fails the request.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&raw_id, "book")?;
    let existing = fetch_book(&state.db, id).await?.ok_or_not_found("Book")?;

    let result = sqlx::query("DELETE FROM books WHERE id = ?1").bind(id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Book not found".to_string()));
    }

    let files: Vec<String> = existing.pdf.into_iter().chain(existing.cover_image).collect();
    remove_uploads(&state, &files).await;

    state.metrics.inc_records_deleted();
    tracing::info!(book_id = id, "Book deleted");
    Ok(Json(MessageResponse::new("Book deleted successfully")))
}
