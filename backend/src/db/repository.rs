use async_trait::async_trait;
use shared::AnalysisResult;
use uuid::Uuid;

use crate::diagnosis::models::{Analysis, AnalysisImage};
use crate::farmers::models::Farmer;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found")]
    NotFound,
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn create_analysis(&self, analysis: &Analysis) -> Result<(), RepositoryError>;

    /// Stores a batch of images. Indices must be unique per analysis.
    async fn add_images(&self, images: &[AnalysisImage]) -> Result<(), RepositoryError>;

    async fn save_result(
        &self,
        analysis_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<(), RepositoryError>;

    /// Loads an analysis with its images ordered by index.
    async fn get_analysis(&self, analysis_id: Uuid) -> Result<Option<Analysis>, RepositoryError>;

    /// Clears the owner of every analysis owned by `farmer_id`; returns how
    /// many were detached.
    async fn detach_farmer(&self, farmer_id: Uuid) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait FarmerRepository: Send + Sync {
    /// Fails with `Conflict` when the phone or email is already taken.
    async fn create_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError>;

    async fn get_farmer_by_id(&self, farmer_id: Uuid) -> Result<Option<Farmer>, RepositoryError>;

    async fn get_farmer_by_phone(&self, phone: &str) -> Result<Option<Farmer>, RepositoryError>;

    async fn get_farmer_by_email(&self, email: &str) -> Result<Option<Farmer>, RepositoryError>;

    async fn update_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError>;

    async fn delete_farmer(&self, farmer_id: Uuid) -> Result<(), RepositoryError>;
}
