//! Raw upload storage.
//!
//! Documents keep a blob reference (`Document::file_path`) that resolves
//! through a [`BlobStore`]. The pipeline only ever reads; uploads and deletes
//! come from the document CRUD operations.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::{ServiceResult, StorageError};

/// Byte storage addressed by opaque relative references
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an upload, returning the reference to keep on the document
    async fn put(&self, document_id: &str, filename: &str, data: &[u8]) -> ServiceResult<String>;

    /// Read a stored blob
    async fn read(&self, reference: &str) -> ServiceResult<Vec<u8>>;

    /// Remove a stored blob. Removing a missing blob is not an error.
    async fn delete(&self, reference: &str) -> ServiceResult<()>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Blob store on the local filesystem
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, creating `root` if needed
    pub fn new(root: PathBuf) -> ServiceResult<Self> {
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            reference: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference under the root, refusing anything that could escape it
    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(reference);
        let well_formed = !reference.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !well_formed {
            return Err(StorageError::InvalidReference {
                reference: reference.to_string(),
            });
        }
        Ok(self.root.join(path))
    }
}

/// Keep only characters that are safe in a file name
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, document_id: &str, filename: &str, data: &[u8]) -> ServiceResult<String> {
        let reference = format!("{}/{}", document_id, sanitize_filename(filename));
        let path = self.resolve(&reference)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    reference: reference.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Io {
                reference: reference.clone(),
                source,
            })?;

        tracing::debug!(reference = %reference, bytes = data.len(), "Stored blob");
        Ok(reference)
    }

    async fn read(&self, reference: &str) -> ServiceResult<Vec<u8>> {
        let path = self.resolve(reference)?;

        tokio::fs::read(&path).await.map_err(|source| {
            let err = if source.kind() == ErrorKind::NotFound {
                StorageError::NotFound {
                    reference: reference.to_string(),
                }
            } else {
                StorageError::Io {
                    reference: reference.to_string(),
                    source,
                }
            };
            err.into()
        })
    }

    async fn delete(&self, reference: &str) -> ServiceResult<()> {
        let path = self.resolve(reference)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StorageError::Io {
                    reference: reference.to_string(),
                    source,
                }
                .into());
            }
        }

        // Per-document directory; ignore failure if something else lives there
        if let Some(parent) = path.parent() {
            if parent != self.root {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my file (1).txt"), "my_file__1_.txt");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn test_put_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs")).unwrap();

        let reference = store.put("doc-1", "notes.txt", b"hello").await.unwrap();
        assert_eq!(reference, "doc-1/notes.txt");
        assert_eq!(store.read(&reference).await.unwrap(), b"hello");

        store.delete(&reference).await.unwrap();
        assert!(matches!(
            store.read(&reference).await,
            Err(ServiceError::Storage(StorageError::NotFound { .. }))
        ));
        // Deleting twice is fine
        store.delete(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf()).unwrap();

        for reference in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(
                    store.read(reference).await,
                    Err(ServiceError::Storage(StorageError::InvalidReference { .. }))
                ),
                "{reference} should be rejected"
            );
        }
    }
}
