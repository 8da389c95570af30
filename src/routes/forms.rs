//! Request bodies that arrive either as `multipart/form-data` or as JSON.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    storage::UploadSlot,
};

/// A create/update body. Multipart is read lazily by the handler so it can
/// decide where each file goes.
pub enum Submission<T> {
    Form(Multipart),
    Json(T),
}

impl<S, T> FromRequest<S> for Submission<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            Multipart::from_request(req, state)
                .await
                .map(Submission::Form)
                .map_err(|e| AppError::BadRequest(e.body_text()))
        } else {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(body)| Submission::Json(body))
                .map_err(|e| AppError::BadRequest(e.body_text()))
        }
    }
}

/// A file part of a multipart body, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
}

/// Text fields and file parts of a multipart body.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    // Browsers send an empty, unnamed part for an untouched file input
                    if bytes.is_empty() && file_name.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile { field: name, file_name, bytes });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    /// Integer field; blank counts as absent, anything else unparseable is a
    /// validation error.
    pub fn int(&self, name: &str) -> AppResult<Option<i64>> {
        match self.fields.get(name).map(|v| v.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| AppError::ValidationError {
                field: name.to_string(),
                message: format!("Expected an integer, got '{}'", raw),
            }),
        }
    }

    /// Removes and returns the last file uploaded under `field`.
    pub fn take_file(&mut self, field: &str) -> Option<UploadedFile> {
        let idx = self.files.iter().rposition(|f| f.field == field)?;
        Some(self.files.remove(idx))
    }

    /// Removes and returns the last file part regardless of its field name.
    pub fn take_any_file(&mut self) -> Option<UploadedFile> {
        self.files.pop()
    }
}

/// Checks the per-slot size limit and writes the file, returning its public path.
pub async fn store_upload(state: &AppState, slot: UploadSlot, file: &UploadedFile) -> AppResult<String> {
    let limit = if slot.is_pdf() { state.config.uploads.max_pdf_bytes } else { state.config.uploads.max_image_bytes };
    if file.bytes.len() > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "File '{}' is {} bytes; the limit for {} is {} bytes",
            file.file_name,
            file.bytes.len(),
            file.field,
            limit
        )));
    }
    let public_path = state.uploads.save(slot, &file.file_name, &file.bytes).await?;
    state.metrics.add_upload(file.bytes.len() as u64);
    tracing::info!(field = %file.field, path = %public_path, bytes = file.bytes.len(), "Stored upload");
    Ok(public_path)
}

/// `true` if any author or book row still points at `public_path`. A failed
/// lookup counts as referenced so the file is kept.
async fn still_referenced(state: &AppState, public_path: &str) -> bool {
    let uses = sqlx::query_scalar::<_, i64>(
        r#"SELECT (SELECT COUNT(*) FROM authors WHERE image = ?1)
                + (SELECT COUNT(*) FROM books WHERE pdf = ?1 OR cover_image = ?1)"#,
    )
    .bind(public_path)
    .fetch_one(&state.db)
    .await;
    match uses {
        Ok(n) => n > 0,
        Err(e) => {
            tracing::warn!("Keeping {}: reference check failed: {}", public_path, e);
            true
        }
    }
}

/// Best-effort removal of uploads: files written for a request that then
/// failed, or files a successful update/delete no longer references. Files
/// another row still points at are kept.
pub async fn remove_uploads(state: &AppState, paths: &[String]) {
    let mut orphaned = Vec::with_capacity(paths.len());
    for path in paths {
        if still_referenced(state, path).await {
            tracing::debug!("Keeping {}: still referenced", path);
        } else {
            orphaned.push(path.clone());
        }
    }
    if orphaned.is_empty() {
        return;
    }
    let removed = state.uploads.remove_all(orphaned.iter()).await;
    state.metrics.add_files_removed(removed as u64);
    tracing::debug!("Removed {} of {} uploads", removed, paths.len());
}
