use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use procurement_core::config::UploadsConfig;
use procurement_core::domain::bid::BidId;
use procurement_core::uploads::{
    sanitize_filename, FileStore, FileStoreError, UploadKind, UploadedFile,
};

/// Stores bid attachments on local disk under
/// `<root>/bids/<bid_id>/<submission>/items/<index>/<specs|images>/<file>`.
///
/// Stored paths are relative to `root`, so the upload directory can move
/// without rewriting rows.
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
    max_file_bytes: u64,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self { root: root.into(), max_file_bytes }
    }

    pub fn from_config(config: &UploadsConfig) -> Self {
        Self::new(config.root_dir.clone(), config.max_file_bytes)
    }

    pub fn resolve(&self, stored_path: &str) -> PathBuf {
        self.root.join(stored_path)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        bid_id: BidId,
        submission: Uuid,
        item_index: usize,
        kind: UploadKind,
        file: &UploadedFile,
    ) -> Result<String, FileStoreError> {
        let size = file.bytes.len() as u64;
        if size > self.max_file_bytes {
            return Err(FileStoreError::TooLarge {
                filename: file.filename.clone(),
                size,
                limit: self.max_file_bytes,
            });
        }

        let relative_dir = PathBuf::from("bids")
            .join(bid_id.0.to_string())
            .join(submission.simple().to_string())
            .join("items")
            .join(item_index.to_string())
            .join(kind.directory());
        let relative = relative_dir.join(sanitize_filename(&file.filename));

        let absolute_dir = self.root.join(&relative_dir);
        fs::create_dir_all(&absolute_dir).await.map_err(|source| FileStoreError::Io {
            path: absolute_dir.display().to_string(),
            source,
        })?;

        let absolute = self.root.join(&relative);
        fs::write(&absolute, &file.bytes).await.map_err(|source| FileStoreError::Io {
            path: absolute.display().to_string(),
            source,
        })?;

        debug!(
            event_name = "bid.upload.stored",
            bid_id = bid_id.0,
            submission = %submission,
            item_index,
            kind = kind.directory(),
            size,
            "stored bid attachment"
        );
        Ok(relative.to_string_lossy().into_owned())
    }

    async fn remove(&self, stored_path: &str) -> Result<(), FileStoreError> {
        let absolute = self.resolve(stored_path);
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                Err(FileStoreError::Io { path: absolute.display().to_string(), source })
            }
        }
    }
}
