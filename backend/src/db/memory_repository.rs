use async_trait::async_trait;
use shared::AnalysisResult;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::repository::{AnalysisRepository, FarmerRepository, RepositoryError};
use crate::diagnosis::models::{Analysis, AnalysisImage};
use crate::farmers::models::Farmer;

/// Process-local store used for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    analyses: Arc<RwLock<HashMap<Uuid, Analysis>>>,
    farmers: Arc<RwLock<HashMap<Uuid, Farmer>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn analysis_count(&self) -> usize {
        self.analyses.read().map(|a| a.len()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryRepository {
    async fn create_analysis(&self, analysis: &Analysis) -> Result<(), RepositoryError> {
        let mut analyses = self.analyses.write().map_err(|_| RepositoryError::Poisoned)?;
        if analyses.contains_key(&analysis.id) {
            return Err(RepositoryError::Conflict(format!(
                "analysis {} already exists",
                analysis.id
            )));
        }
        let mut row = analysis.clone();
        row.images.clear();
        analyses.insert(analysis.id, row);
        Ok(())
    }

    async fn add_images(&self, images: &[AnalysisImage]) -> Result<(), RepositoryError> {
        let mut analyses = self.analyses.write().map_err(|_| RepositoryError::Poisoned)?;
        for image in images {
            let analysis = analyses
                .get_mut(&image.analysis_id)
                .ok_or(RepositoryError::NotFound)?;
            if analysis.images.iter().any(|existing| existing.index == image.index) {
                return Err(RepositoryError::Conflict(format!(
                    "analysis {} already has an image at index {}",
                    image.analysis_id, image.index
                )));
            }
            analysis.images.push(image.clone());
            analysis.images.sort_by_key(|existing| existing.index);
        }
        Ok(())
    }

    async fn save_result(
        &self,
        analysis_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<(), RepositoryError> {
        let mut analyses = self.analyses.write().map_err(|_| RepositoryError::Poisoned)?;
        let analysis = analyses
            .get_mut(&analysis_id)
            .ok_or(RepositoryError::NotFound)?;
        analysis.result = result.clone();
        Ok(())
    }

    async fn get_analysis(&self, analysis_id: Uuid) -> Result<Option<Analysis>, RepositoryError> {
        let analyses = self.analyses.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(analyses.get(&analysis_id).cloned())
    }

    async fn detach_farmer(&self, farmer_id: Uuid) -> Result<usize, RepositoryError> {
        let mut analyses = self.analyses.write().map_err(|_| RepositoryError::Poisoned)?;
        let mut detached = 0;
        for analysis in analyses.values_mut() {
            if analysis.farmer_id == Some(farmer_id) {
                analysis.farmer_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }
}

#[async_trait]
impl FarmerRepository for InMemoryRepository {
    async fn create_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError> {
        let mut farmers = self.farmers.write().map_err(|_| RepositoryError::Poisoned)?;
        if farmers.values().any(|f| f.phone == farmer.phone) {
            return Err(RepositoryError::Conflict("phone".into()));
        }
        if farmers.values().any(|f| f.email == farmer.email) {
            return Err(RepositoryError::Conflict("email".into()));
        }
        farmers.insert(farmer.id, farmer.clone());
        Ok(())
    }

    async fn get_farmer_by_id(&self, farmer_id: Uuid) -> Result<Option<Farmer>, RepositoryError> {
        let farmers = self.farmers.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(farmers.get(&farmer_id).cloned())
    }

    async fn get_farmer_by_phone(&self, phone: &str) -> Result<Option<Farmer>, RepositoryError> {
        let farmers = self.farmers.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(farmers.values().find(|f| f.phone == phone).cloned())
    }

    async fn get_farmer_by_email(&self, email: &str) -> Result<Option<Farmer>, RepositoryError> {
        let farmers = self.farmers.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(farmers.values().find(|f| f.email == email).cloned())
    }

    async fn update_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError> {
        let mut farmers = self.farmers.write().map_err(|_| RepositoryError::Poisoned)?;
        if farmers
            .values()
            .any(|f| f.id != farmer.id && f.email == farmer.email)
        {
            return Err(RepositoryError::Conflict("email".into()));
        }
        let slot = farmers.get_mut(&farmer.id).ok_or(RepositoryError::NotFound)?;
        *slot = farmer.clone();
        Ok(())
    }

    async fn delete_farmer(&self, farmer_id: Uuid) -> Result<(), RepositoryError> {
        let mut farmers = self.farmers.write().map_err(|_| RepositoryError::Poisoned)?;
        farmers
            .remove(&farmer_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
