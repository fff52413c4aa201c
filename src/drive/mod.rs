//! Filesystem object storage.
//!
//! Objects live under `<root>/private` (served to signed-in users at
//! `/objects/...`) and `<root>/public` (served anonymously at
//! `/public-objects/...`).

pub mod handlers;

use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

use crate::crm::error::CrmError;
use crate::security::path_guard::{sanitize_object_key, PathGuardError};

pub use handlers::configure;

pub const OBJECTS_PREFIX: &str = "/objects/";
const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Private,
    Public,
}

impl Area {
    fn dir(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object path: {0}")]
    InvalidPath(#[from] PathGuardError),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for CrmError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(e) => CrmError::field("path", e.to_string()),
            StorageError::Io(e) => CrmError::Internal(format!("object storage: {}", e)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStorage {
    root: PathBuf,
}

impl ObjectStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, area: Area, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(area.dir()).join(sanitize_object_key(key)?))
    }

    /// Key of a fresh private upload slot.
    pub fn new_upload_key() -> String {
        format!("{}/{}", UPLOADS_DIR, Uuid::new_v4())
    }

    pub async fn put(&self, area: Area, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(area, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }

    /// `None` when the object does not exist.
    pub async fn get(&self, area: Area, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(area, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn content_type(key: &str) -> String {
        mime_guess::from_path(key)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Normalizes an upload URL (absolute, with query string, or already an
/// object path) to the canonical `/objects/<key>` form.
pub fn normalize_object_path(url: &str) -> Result<String, PathGuardError> {
    let url = url.trim();
    let without_origin = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
        None => url,
    };
    let path = without_origin
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let key = path
        .strip_prefix(OBJECTS_PREFIX)
        .ok_or(PathGuardError::InvalidComponent)?;
    sanitize_object_key(key)?;
    Ok(format!("{}{}", OBJECTS_PREFIX, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_object_path() {
        assert_eq!(
            normalize_object_path("https://crm.example.com/objects/uploads/abc?sig=1").unwrap(),
            "/objects/uploads/abc"
        );
        assert_eq!(
            normalize_object_path("/objects/uploads/abc").unwrap(),
            "/objects/uploads/abc"
        );
        assert!(normalize_object_path("/objects/../secret").is_err());
        assert!(normalize_object_path("https://elsewhere.com/img.png").is_err());
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip_in_area() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::new(dir.path());
        storage.put(Area::Private, "uploads/a.txt", b"hello").await.unwrap();

        assert_eq!(
            storage.get(Area::Private, "uploads/a.txt").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );
        assert!(storage.get(Area::Public, "uploads/a.txt").await.unwrap().is_none());
        assert!(matches!(
            storage.get(Area::Private, "../a.txt").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(ObjectStorage::content_type("photo.jpg"), "image/jpeg");
        assert_eq!(ObjectStorage::content_type("uploads/blob"), "application/octet-stream");
    }
}
