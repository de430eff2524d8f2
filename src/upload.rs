//! Upload file store
//!
//! Token-addressed store backing the file form variant: the form task emits
//! an upload token, the `/api/upload` handler stores the received file under
//! it, and the form task surfaces the token's status as a field hint until
//! the file is in place.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{KhronicleError, Result};
use crate::typedmap::TypedKey;

/// Process-store key the upload store is published under.
pub fn upload_store_key() -> TypedKey<UploadStore> {
    TypedKey::new("khronicle.upload.store")
}

/// Lifecycle of one upload token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// Token issued, no file received yet.
    Waiting,
    /// File stored and ready for ingestion.
    Uploaded { path: PathBuf, size: u64 },
}

#[derive(Debug)]
pub struct UploadStore {
    dir: PathBuf,
    max_size: u64,
    entries: DashMap<String, UploadStatus>,
}

impl UploadStore {
    pub fn new(dir: PathBuf, max_size: u64) -> Self {
        Self {
            dir,
            max_size,
            entries: DashMap::new(),
        }
    }

    /// Issue (or re-issue) a token. Idempotent: an uploaded token keeps its
    /// file across repeated dry-runs.
    pub fn register(&self, token: &str) -> UploadStatus {
        self.entries
            .entry(token.to_string())
            .or_insert(UploadStatus::Waiting)
            .clone()
    }

    pub fn status(&self, token: &str) -> Option<UploadStatus> {
        self.entries.get(token).map(|e| e.clone())
    }

    /// Store the uploaded bytes for a registered token.
    pub async fn store(&self, token: &str, bytes: &[u8]) -> Result<PathBuf> {
        if !self.entries.contains_key(token) {
            return Err(KhronicleError::UnknownUploadToken {
                token: token.to_string(),
            });
        }
        if bytes.len() as u64 > self.max_size {
            return Err(KhronicleError::UploadTooLarge {
                limit: self.max_size,
            });
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(sanitize(token));
        tokio::fs::write(&path, bytes).await?;
        self.entries.insert(
            token.to_string(),
            UploadStatus::Uploaded {
                path: path.clone(),
                size: bytes.len() as u64,
            },
        );
        Ok(path)
    }

    /// Stored file path for an uploaded token.
    pub fn uploaded_path(&self, token: &str) -> Option<PathBuf> {
        match self.status(token)? {
            UploadStatus::Uploaded { path, .. } => Some(path),
            UploadStatus::Waiting => None,
        }
    }
}

/// Tokens become file names; keep them path-safe.
fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shared handle used by the HTTP layer and the file form task.
pub type SharedUploadStore = Arc<UploadStore>;
