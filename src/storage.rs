//! Local storage for uploaded author images, book covers and book PDFs.
//!
//! Files live under a single upload root: author images directly in it, book
//! files in `books/`. Rows store the public path (`/uploads/...`) that the
//! static file service answers on, never the disk path.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// URL prefix the upload root is served under.
pub const PUBLIC_PREFIX: &str = "/uploads/";

const MAX_FILE_NAME_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not an upload path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which record field an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSlot {
    AuthorImage,
    BookCover,
    BookPdf,
}

impl UploadSlot {
    fn subdir(self) -> Option<&'static str> {
        match self {
            UploadSlot::AuthorImage => None,
            UploadSlot::BookCover | UploadSlot::BookPdf => Some("books"),
        }
    }

    pub fn is_pdf(self) -> bool {
        matches!(self, UploadSlot::BookPdf)
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to a fresh file and returns its public path.
    ///
    /// Names are `<unix millis>-<sanitized original name>`. The file is opened
    /// with `create_new`; if that name is already taken a random suffix is
    /// added instead of overwriting.
    pub async fn save(&self, slot: UploadSlot, original_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let dir = match slot.subdir() {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let safe_name = sanitize_file_name(original_name);
        let millis = chrono::Utc::now().timestamp_millis();
        let mut file_name = format!("{}-{}", millis, safe_name);

        let mut file = match open_new(&dir.join(&file_name)).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                file_name = format!("{}-{}-{}", millis, &suffix[..8], safe_name);
                tracing::debug!("Upload name collision, using {}", file_name);
                open_new(&dir.join(&file_name)).await?
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;

        Ok(match slot.subdir() {
            Some(sub) => format!("{}{}/{}", PUBLIC_PREFIX, sub, file_name),
            None => format!("{}{}", PUBLIC_PREFIX, file_name),
        })
    }

    /// Maps a public `/uploads/...` path to the file on disk.
    pub fn resolve(&self, public_path: &str) -> Result<PathBuf, StorageError> {
        let relative = validate_public_path(public_path)?;
        Ok(self.root.join(relative))
    }

    /// Best-effort removal. Returns `true` only if a file was deleted; a
    /// missing file or an invalid path is logged and ignored.
    pub async fn remove(&self, public_path: &str) -> bool {
        let path = match self.resolve(public_path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Skipping removal of {}: {}", public_path, e);
                return false;
            }
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed upload {}", path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to remove upload {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Removes every path in `paths`, returning how many files were deleted.
    pub async fn remove_all<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut removed = 0;
        for path in paths {
            if self.remove(path).await {
                removed += 1;
            }
        }
        removed
    }
}

async fn open_new(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new().write(true).create_new(true).open(path).await
}

/// Checks that `public_path` points inside the upload root and returns the
/// part after `/uploads/`.
pub fn validate_public_path(public_path: &str) -> Result<&str, StorageError> {
    let relative = public_path
        .strip_prefix(PUBLIC_PREFIX)
        .ok_or_else(|| StorageError::InvalidPath(public_path.to_string()))?;
    if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
        return Err(StorageError::InvalidPath(public_path.to_string()));
    }
    let only_normal = Path::new(relative).components().all(|c| matches!(c, Component::Normal(_)));
    if !only_normal {
        return Err(StorageError::InvalidPath(public_path.to_string()));
    }
    Ok(relative)
}

/// Like [`validate_public_path`], and the file must also sit directly in the
/// directory `slot` stores into (`books/` for book files, the root for
/// portraits).
pub fn validate_slot_path(public_path: &str, slot: UploadSlot) -> Result<&str, StorageError> {
    let relative = validate_public_path(public_path)?;
    let dir = Path::new(relative).parent().and_then(Path::to_str).unwrap_or_default();
    if dir != slot.subdir().unwrap_or_default() {
        return Err(StorageError::InvalidPath(public_path.to_string()));
    }
    Ok(relative)
}

/// Keeps the final name component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
