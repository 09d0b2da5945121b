use shared::AnalysisResult;
use std::sync::Arc;
use uuid::Uuid;

use super::classifier::ClassifierService;
use super::mock::MockGenerator;
use super::models::{Analysis, AnalysisImage, AnalysisView};
use super::upload::UploadedImage;
use crate::db::repository::AnalysisRepository;
use crate::error::AppError;
use crate::storage::{calculate_image_hash, generate_image_key, ImageStore};

pub const MAX_IMAGES: usize = 5;
pub const MAX_CROP_TYPE_CHARS: usize = 100;
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Default)]
pub struct AnalyzeRequest {
    pub crop_type: String,
    pub language: String,
    pub images: Vec<UploadedImage>,
}

/// Empty means English; anything else must be a 2 to 8 character code.
pub fn normalize_language(raw: &str) -> Result<String, AppError> {
    let language = raw.trim();
    if language.is_empty() {
        return Ok(DEFAULT_LANGUAGE.to_string());
    }
    let len = language.chars().count();
    if !(2..=8).contains(&len) {
        return Err(AppError::Validation(
            "Language must be a 2 to 8 character code".into(),
        ));
    }
    Ok(language.to_string())
}

pub struct DiagnosisService {
    analyses: Arc<dyn AnalysisRepository>,
    images: Arc<dyn ImageStore>,
    classifier: Arc<ClassifierService>,
    mock: MockGenerator,
}

impl DiagnosisService {
    pub fn new(
        analyses: Arc<dyn AnalysisRepository>,
        images: Arc<dyn ImageStore>,
        classifier: Arc<ClassifierService>,
        mock: MockGenerator,
    ) -> Self {
        Self {
            analyses,
            images,
            classifier,
            mock,
        }
    }

    pub async fn analyze(
        &self,
        farmer_id: Option<Uuid>,
        request: AnalyzeRequest,
    ) -> Result<AnalysisView, AppError> {
        if request.images.is_empty() {
            return Err(AppError::Validation("No images uploaded".into()));
        }
        if request.images.len() > MAX_IMAGES {
            return Err(AppError::Validation(format!(
                "Maximum {} images allowed",
                MAX_IMAGES
            )));
        }
        let crop_type = request.crop_type.trim().to_string();
        if crop_type.chars().count() > MAX_CROP_TYPE_CHARS {
            return Err(AppError::Validation(format!(
                "Crop type must be at most {} characters",
                MAX_CROP_TYPE_CHARS
            )));
        }
        let language = normalize_language(&request.language)?;

        let mut analysis = Analysis::new(farmer_id, crop_type, language);

        let mut rows = Vec::with_capacity(request.images.len());
        for (index, upload) in request.images.iter().enumerate() {
            let hash = calculate_image_hash(&upload.data);
            let key = generate_image_key(analysis.id, index, &hash, upload.extension());
            if let Err(e) = self
                .images
                .put(&key, &upload.data, upload.content_type())
                .await
            {
                self.discard_images(&rows).await;
                return Err(e.into());
            }
            log::debug!(
                "Stored image {} ({}) as {}",
                index,
                upload.filename.as_deref().unwrap_or("unnamed"),
                key
            );
            rows.push(AnalysisImage::new(analysis.id, key, index as u32));
        }

        if let Err(e) = self.analyses.create_analysis(&analysis).await {
            self.discard_images(&rows).await;
            return Err(e.into());
        }
        self.analyses.add_images(&rows).await?;
        log::info!(
            "Analysis {} stored {} images (crop '{}')",
            analysis.id,
            rows.len(),
            analysis.crop_type
        );

        let keys: Vec<String> = rows.iter().map(|row| row.image.clone()).collect();
        let items = match self
            .classifier
            .classify(self.images.as_ref(), &keys, &analysis.crop_type)
            .await
        {
            Ok(items) if items.len() == keys.len() => items,
            Ok(items) => {
                log::warn!(
                    "Classifier returned {} records for {} images; using mock diagnoses",
                    items.len(),
                    keys.len()
                );
                self.mock.generate(keys.len(), &analysis.crop_type)
            }
            Err(e) => {
                log::warn!("Classifier unavailable for analysis {}: {}", analysis.id, e);
                self.mock.generate(keys.len(), &analysis.crop_type)
            }
        };

        analysis.result = AnalysisResult { items };
        analysis.images = rows;
        self.analyses
            .save_result(analysis.id, &analysis.result)
            .await?;

        Ok(AnalysisView::new(&analysis, self.images.as_ref()))
    }

    async fn discard_images(&self, rows: &[AnalysisImage]) {
        for row in rows {
            if let Err(e) = self.images.delete(&row.image).await {
                log::warn!("Could not remove orphaned image {}: {}", row.image, e);
            }
        }
    }

    pub async fn get_analysis(&self, analysis_id: Uuid) -> Result<Analysis, AppError> {
        self.analyses
            .get_analysis(analysis_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Analysis not found".into()))
    }

    pub async fn get_view(&self, analysis_id: Uuid) -> Result<AnalysisView, AppError> {
        let analysis = self.get_analysis(analysis_id).await?;
        Ok(AnalysisView::new(&analysis, self.images.as_ref()))
    }
}
