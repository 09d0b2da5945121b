use async_trait::async_trait;
use std::path::PathBuf;

use super::{validate_key, ImageStore, StorageError};

/// Image store backed by a directory that is also served under `url_prefix`.
#[derive(Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        log::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn round_trips_bytes_through_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/media");

        store
            .put("crop_doctor/abc/00_deadbeef.png", b"png-bytes", "image/png")
            .await
            .unwrap();

        assert!(dir.path().join("crop_doctor/abc/00_deadbeef.png").exists());
        let data = store.get("crop_doctor/abc/00_deadbeef.png").await.unwrap();
        assert_eq!(data, b"png-bytes");
    }

    #[actix_web::test]
    async fn delete_removes_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/media");
        store
            .put("crop_doctor/abc/01_cafe.png", b"leaf", "image/png")
            .await
            .unwrap();

        store.delete("crop_doctor/abc/01_cafe.png").await.unwrap();
        assert!(!dir.path().join("crop_doctor/abc/01_cafe.png").exists());
        store.delete("crop_doctor/abc/01_cafe.png").await.unwrap();
    }

    #[actix_web::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/media");
        assert!(matches!(
            store.get("crop_doctor/none.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn refuses_keys_outside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/media");
        assert!(matches!(
            store.put("../escape.png", b"x", "image/png").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn public_url_joins_prefix_and_key() {
        let store = LocalImageStore::new("media", "/media/");
        assert_eq!(
            store.public_url("crop_doctor/a/00_b.jpg"),
            "/media/crop_doctor/a/00_b.jpg"
        );
    }
}
