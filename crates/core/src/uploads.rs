//! Contract for the storage that holds files attached to bid items.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::bid::BidId;
use crate::errors::ProcurementError;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

const FALLBACK_FILENAME: &str = "sanitized_filename";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadKind {
    Spec,
    Image,
}

impl UploadKind {
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Spec => "specs",
            Self::Image => "images",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file `{filename}` is {size} bytes, limit is {limit}")]
    TooLarge { filename: String, size: u64, limit: u64 },
    #[error("file storage i/o failed for `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
}

impl From<FileStoreError> for ProcurementError {
    fn from(error: FileStoreError) -> Self {
        match error {
            too_large @ FileStoreError::TooLarge { .. } => {
                ProcurementError::invalid_input(too_large.to_string())
            }
            io @ FileStoreError::Io { .. } => ProcurementError::storage(io.to_string()),
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists one file under a path namespaced by bid, submission attempt and
    /// item index, and returns the stored path. `submission` is fresh for every
    /// insert attempt, so a rolled-back bid whose id is reused never shares a
    /// directory with the bid that reuses it. Files above the size ceiling are
    /// refused before anything is written.
    async fn store(
        &self,
        bid_id: BidId,
        submission: Uuid,
        item_index: usize,
        kind: UploadKind,
        file: &UploadedFile,
    ) -> Result<String, FileStoreError>;

    async fn remove(&self, stored_path: &str) -> Result<(), FileStoreError>;
}

/// Reduces a client-supplied filename to `[A-Za-z0-9_.-]`, collapsing runs of
/// underscores and refusing names that would resolve to a directory.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-') { ch } else { '_' };
        if mapped == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(mapped);
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return FALLBACK_FILENAME.to_owned();
    }
    trimmed.to_owned()
}
