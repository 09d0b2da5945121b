pub mod local_store;
pub mod s3_service;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use local_store::LocalImageStore;
pub use s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Persists uploaded image bytes under opaque keys.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the object at `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// URL clients can fetch the stored image from.
    fn public_url(&self, key: &str) -> String;
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

/// Key for the `index`-th image of an analysis. The index prefix keeps keys
/// sortable in upload order.
pub fn generate_image_key(
    analysis_id: Uuid,
    index: usize,
    image_hash: &str,
    file_extension: &str,
) -> String {
    let short_hash = image_hash.get(..12).unwrap_or(image_hash);
    format!(
        "crop_doctor/{}/{:02}_{}.{}",
        analysis_id, index, short_hash, file_extension
    )
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
