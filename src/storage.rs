//! File storage collaborator.
//!
//! Ingestion hands raw PDF bytes to a storage backend and gets back a durable
//! `{url, path, id}` triple that is persisted on the chat row. The default
//! backend writes to local disk; a hosted provider can be swapped in behind
//! the same trait.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while storing uploaded files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing filesystem rejected the write.
    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Resolvable URL for the stored file.
    pub url: String,
    /// Backend-relative path of the stored file.
    pub path: String,
    /// Durable identifier of the stored content.
    pub id: String,
}

/// Interface implemented by file storage backends.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist the bytes under the given folder and return the durable locator.
    async fn upload(
        &self,
        bytes: &[u8],
        folder: &str,
        file_name: &str,
    ) -> Result<StoredFile, StorageError>;
}

/// Disk-backed storage rooted at a configurable directory.
pub struct LocalFileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalFileStorage {
    /// Construct a storage backend writing under `root`, with URLs prefixed by
    /// `public_base_url`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn upload(
        &self,
        bytes: &[u8],
        folder: &str,
        file_name: &str,
    ) -> Result<StoredFile, StorageError> {
        // Content-addressed id: identical bytes map to the same stored object.
        let id = hex::encode(Sha256::digest(bytes));
        let stored_name = format!("{}_{}", &id[..12], sanitize_file_name(file_name));
        let relative_path = format!("{}/{stored_name}", sanitize_folder(folder));

        let full_path = self.root.join(&relative_path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, bytes).await?;

        tracing::debug!(path = %relative_path, bytes = bytes.len(), "Stored uploaded file");

        Ok(StoredFile {
            url: format!("{}/{relative_path}", self.public_base_url),
            path: relative_path,
            id,
        })
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned = sanitize_segment(name);
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

/// Keep the write path inside the storage root. The folder comes from caller
/// input (it embeds the user id), so empty, `.` and `..` components are
/// dropped and the rest is cleaned per segment.
fn sanitize_folder(folder: &str) -> String {
    let cleaned: Vec<String> = folder
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(sanitize_segment)
        .collect();
    if cleaned.is_empty() {
        "uploads".to_string()
    } else {
        cleaned.join("/")
    }
}

fn sanitize_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_storage() -> (LocalFileStorage, PathBuf) {
        let root = std::env::temp_dir().join(format!("docchat-test-{}", Uuid::new_v4()));
        (
            LocalFileStorage::new(root.clone(), "http://localhost:4800/files/"),
            root,
        )
    }

    #[tokio::test]
    async fn upload_writes_file_and_builds_locator() {
        let (storage, root) = temp_storage();
        let stored = storage
            .upload(b"%PDF-1.4 fake", "docchat/user-1", "My Report.pdf")
            .await
            .expect("upload");

        assert!(stored.path.starts_with("docchat/user-1/"));
        assert!(stored.path.ends_with("My_Report.pdf"));
        assert_eq!(
            stored.url,
            format!("http://localhost:4800/files/{}", stored.path)
        );
        assert_eq!(stored.id.len(), 64);

        let written = std::fs::read(root.join(&stored.path)).expect("written file");
        assert_eq!(written, b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn traversal_folder_segments_cannot_escape_the_root() {
        let (storage, root) = temp_storage();
        let stored = storage
            .upload(b"%PDF-1.4 fake", "docchat/../../escape", "evil.pdf")
            .await
            .expect("upload");

        assert!(!stored.path.contains(".."));
        assert!(stored.path.starts_with("docchat/escape/"));
        assert!(root.join(&stored.path).exists());
    }

    #[tokio::test]
    async fn identical_bytes_share_a_content_id() {
        let (storage, _root) = temp_storage();
        let first = storage
            .upload(b"same bytes", "f", "a.pdf")
            .await
            .expect("upload");
        let second = storage
            .upload(b"same bytes", "f", "b.pdf")
            .await
            .expect("upload");
        assert_eq!(first.id, second.id);
        assert_ne!(first.path, second.path);
    }
}
