use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::AnalysisResult;
use uuid::Uuid;

use crate::storage::ImageStore;

/// One uploaded image of an analysis. `image` is the storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisImage {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub image: String,
    pub index: u32,
    pub created_at: DateTime<Utc>,
}

impl AnalysisImage {
    pub fn new(analysis_id: Uuid, image: String, index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            analysis_id,
            image,
            index,
            created_at: Utc::now(),
        }
    }
}

/// A diagnostic request. `images` is always ordered by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub farmer_id: Option<Uuid>,
    pub crop_type: String,
    pub request_language: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<AnalysisImage>,
}

impl Analysis {
    pub fn new(farmer_id: Option<Uuid>, crop_type: String, request_language: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            farmer_id,
            crop_type,
            request_language,
            result: AnalysisResult::default(),
            created_at: Utc::now(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisImageView {
    pub id: Uuid,
    pub image: String,
    pub index: u32,
}

/// Client-facing shape of an analysis; image keys become URLs.
#[derive(Debug, Serialize)]
pub struct AnalysisView {
    pub id: Uuid,
    pub crop_type: String,
    pub request_language: String,
    pub result: AnalysisResult,
    pub images: Vec<AnalysisImageView>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisView {
    pub fn new(analysis: &Analysis, store: &dyn ImageStore) -> Self {
        Self {
            id: analysis.id,
            crop_type: analysis.crop_type.clone(),
            request_language: analysis.request_language.clone(),
            result: analysis.result.clone(),
            images: analysis
                .images
                .iter()
                .map(|image| AnalysisImageView {
                    id: image.id,
                    image: store.public_url(&image.image),
                    index: image.index,
                })
                .collect(),
            created_at: analysis.created_at,
        }
    }
}
