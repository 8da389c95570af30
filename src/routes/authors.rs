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
        book_rows::{books_with_authors, BOOK_WITH_AUTHOR_SELECT},
        forms::{remove_uploads, store_upload, FormData, Submission},
        query::ApiQuery,
    },
    state::AppState,
    storage::UploadSlot,
    types::{Author, AuthorInput, AuthorPage, BookWithAuthor, MessageResponse, PageQuery},
};

/// Author fields plus an optional new portrait, however the body arrived.
async fn read_submission(
    state: &AppState,
    submission: Submission<AuthorInput>,
) -> AppResult<(AuthorInput, Option<String>)> {
    match submission {
        Submission::Json(input) => Ok((input, None)),
        Submission::Form(multipart) => {
            let mut form = FormData::read(multipart).await?;
            let input = AuthorInput { name: form.text("name"), bio: form.text("bio") };
            // Any file part is the portrait; "image" wins if several were sent
            let file = form.take_file("image").or_else(|| form.take_any_file());
            let image = match file {
                Some(f) => Some(store_upload(state, UploadSlot::AuthorImage, &f).await?),
                None => None,
            };
            Ok((input, image))
        }
    }
}

async fn fetch_author(state: &AppState, id: i64) -> AppResult<Author> {
    sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = ?1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_not_found("Author")
}

pub async fn list_authors(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<AuthorPage>> {
    let params = page_params(&query, state.config.pagination.default_limit, state.config.pagination.max_limit)?;

    let (total_authors, data) = tokio::try_join!(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM authors").fetch_one(&state.db),
        sqlx::query_as::<_, Author>("SELECT * FROM authors ORDER BY id ASC LIMIT ?1 OFFSET ?2")
            .bind(params.limit)
            .bind(params.offset())
            .fetch_all(&state.db),
    )?;

    Ok(Json(AuthorPage {
        page: params.page,
        limit: params.limit,
        total_authors,
        total_pages: params.total_pages(total_authors),
        data,
    }))
}

pub async fn all_authors(State(state): State<AppState>) -> AppResult<Json<Vec<Author>>> {
    let authors =
        sqlx::query_as::<_, Author>("SELECT * FROM authors ORDER BY id ASC").fetch_all(&state.db).await?;
    Ok(Json(authors))
}

pub async fn get_author(State(state): State<AppState>, Path(raw_id): Path<String>) -> AppResult<Json<Author>> {
    let id = parse_id(&raw_id, "author")?;
    Ok(Json(fetch_author(&state, id).await?))
}

/// Books written by one author, newest first.
pub async fn author_books(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Vec<BookWithAuthor>>> {
    let id = parse_id(&raw_id, "author")?;
    fetch_author(&state, id).await?;

    let sql = format!("{} WHERE b.author_id = ?1 ORDER BY b.created_at DESC, b.id DESC", BOOK_WITH_AUTHOR_SELECT);
    let rows = sqlx::query(&sql).bind(id).fetch_all(&state.db).await?;
    Ok(Json(books_with_authors(&rows)?))
}

pub async fn create_author(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    submission: Submission<AuthorInput>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit("POST /authors", ip).await?;

    let (input, image) = read_submission(&state, submission).await?;
    let new_files: Vec<String> = image.iter().cloned().collect();

    let Some(name) = non_empty(input.name) else {
        remove_uploads(&state, &new_files).await;
        return Err(AppError::ValidationError { field: "name".to_string(), message: "Name is required".to_string() });
    };
    let bio = input.bio.map(|b| b.trim().to_string()).unwrap_or_default();

    let now = now_timestamp();
    let inserted = sqlx::query_as::<_, Author>(
        r#"INSERT INTO authors (name, bio, image, name_fold, bio_fold, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&bio)
    .bind(&image)
    .bind(search_fold(&name))
    .bind(search_fold(&bio))
    .bind(&now)
    .fetch_one(&state.db)
    .await;

    let author = match inserted {
        Ok(author) => author,
        Err(e) => {
            remove_uploads(&state, &new_files).await;
            return Err(e.into());
        }
    };

    state.metrics.inc_authors_created();
    tracing::info!(author_id = author.id, "Author created");
    Ok((StatusCode::CREATED, Json(author)))
}

/// Partial update: only provided fields change. A new portrait replaces the
/// old file once the row is updated.
pub async fn update_author(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    submission: Submission<AuthorInput>,
) -> AppResult<Json<Author>> {
    let id = parse_id(&raw_id, "author")?;
    let existing = fetch_author(&state, id).await?;

    let (input, image) = read_submission(&state, submission).await?;
    let new_files: Vec<String> = image.iter().cloned().collect();

    let name = non_empty(input.name);
    let bio = input.bio.map(|b| b.trim().to_string());

    let updated = sqlx::query_as::<_, Author>(
        r#"UPDATE authors
           SET name = COALESCE(?1, name),
               bio = COALESCE(?2, bio),
               image = COALESCE(?3, image),
               name_fold = COALESCE(?4, name_fold),
               bio_fold = COALESCE(?5, bio_fold),
               updated_at = ?6
           WHERE id = ?7
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&bio)
    .bind(&image)
    .bind(name.as_deref().map(search_fold))
    .bind(bio.as_deref().map(search_fold))
    .bind(now_timestamp())
    .bind(id)
    .fetch_optional(&state.db)
    .await;

    let author = match updated {
        Ok(Some(author)) => author,
        Ok(None) => {
            remove_uploads(&state, &new_files).await;
            return Err(AppError::NotFound("Author not found".to_string()));
        }
        Err(e) => {
            remove_uploads(&state, &new_files).await;
            return Err(e.into());
        }
    };

    if image.is_some() {
        let replaced: Vec<String> = existing.image.into_iter().filter(|old| Some(old) != image.as_ref()).collect();
        remove_uploads(&state, &replaced).await;
    }

    tracing::info!(author_id = id, "Author updated");
    Ok(Json(author))
}

pub async fn delete_author(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&raw_id, "author")?;
    let existing = fetch_author(&state, id).await?;

    let result = sqlx::query("DELETE FROM authors WHERE id = ?1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("Author still has books; delete or reassign them first".to_string())
            }
            other => other,
        })?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Author not found".to_string()));
    }

    let files: Vec<String> = existing.image.into_iter().collect();
    remove_uploads(&state, &files).await;

    state.metrics.inc_records_deleted();
    tracing::info!(author_id = id, "Author deleted");
    Ok(Json(MessageResponse::new("Author deleted")))
}
