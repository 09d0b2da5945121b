use actix_web::web;
use async_trait::async_trait;
use image::imageops::FilterType;
use ndarray::{Array2, Array4};
use shared::DiagnosisRecord;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::class_map::{ClassMap, ClassMapCatalog, ClassMapError};
use super::tract_backend;
use crate::config::ClassifierConfig;
use crate::storage::{ImageStore, StorageError};

pub const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("No classifier model configured")]
    NotConfigured,
    #[error("Classifier unavailable")]
    Unavailable,
    #[error("Model download failed: {0}")]
    Download(String),
    #[error("Model load failed: {0}")]
    Load(String),
    #[error("Failed to read image {key}: {source}")]
    Storage { key: String, source: StorageError },
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Inference task failed: {0}")]
    Blocking(String),
}

/// Memory order the model expects its image batch in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    #[default]
    Nchw,
    Nhwc,
}

/// A loaded image model. Takes a batch of RGB images scaled to `[0, 1]`
/// and returns one row of class scores per image.
pub trait InferenceBackend: Send + Sync {
    fn input_size(&self) -> u32 {
        DEFAULT_INPUT_SIZE
    }

    fn layout(&self) -> Layout {
        Layout::Nchw
    }

    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ClassifierError>;
}

/// Produces the inference backend on first use.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>, ClassifierError>;
}

/// Loads the ONNX model named by the classifier configuration.
struct TractLoader(ClassifierConfig);

#[async_trait]
impl BackendLoader for TractLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>, ClassifierError> {
        let backend = tract_backend::load(&self.0).await?;
        Ok(Arc::new(backend))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub index: usize,
    /// Percentage with one decimal place.
    pub confidence: f64,
}

/// Decodes each payload, resizes it to `size` x `size` and stacks the
/// results into a single batch.
pub fn preprocess(
    payloads: &[Vec<u8>],
    size: u32,
    layout: Layout,
) -> Result<Array4<f32>, ClassifierError> {
    let side = size as usize;
    let mut batch = match layout {
        Layout::Nchw => Array4::<f32>::zeros((payloads.len(), 3, side, side)),
        Layout::Nhwc => Array4::<f32>::zeros((payloads.len(), side, side, 3)),
    };

    for (n, payload) in payloads.iter().enumerate() {
        let rgb = image::load_from_memory(payload)?
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                match layout {
                    Layout::Nchw => batch[[n, c, y, x]] = value,
                    Layout::Nhwc => batch[[n, y, x, c]] = value,
                }
            }
        }
    }
    Ok(batch)
}

/// Builds a score matrix from a raw model output. A one-dimensional output
/// is a single class column; trailing dimensions beyond the second are
/// flattened.
pub fn scores_from_shape(shape: &[usize], values: Vec<f32>) -> Result<Array2<f32>, ClassifierError> {
    let (rows, cols) = match shape {
        [] => return Err(ClassifierError::Output("scalar output".into())),
        [n] => (*n, 1),
        [n, rest @ ..] => (*n, rest.iter().product()),
    };
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| ClassifierError::Output(e.to_string()))
}

fn is_distribution(row: &[f32]) -> bool {
    let sum: f32 = row.iter().sum();
    row.iter().all(|p| (0.0..=1.0).contains(p)) && (sum - 1.0).abs() < 1e-3
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

/// Highest-scoring class per row, first index on ties. Rows that are empty
/// or do not yield finite probabilities are rejected.
pub fn top_predictions(scores: &Array2<f32>) -> Result<Vec<Prediction>, ClassifierError> {
    scores
        .rows()
        .into_iter()
        .enumerate()
        .map(|(n, row)| {
            let row: Vec<f32> = row.iter().copied().collect();
            if row.is_empty() {
                return Err(ClassifierError::Output(format!("row {} has no scores", n)));
            }
            let probabilities = if is_distribution(&row) {
                row
            } else {
                softmax(&row)
            };
            if probabilities.iter().any(|p| !p.is_finite()) {
                return Err(ClassifierError::Output(format!(
                    "row {} has non-finite scores",
                    n
                )));
            }

            let mut index = 0;
            for (i, p) in probabilities.iter().enumerate() {
                if *p > probabilities[index] {
                    index = i;
                }
            }
            let p = f64::from(probabilities[index]);
            let confidence = ((p * 1000.0).round() / 10.0).clamp(0.0, 100.0);
            Ok(Prediction { index, confidence })
        })
        .collect()
}

fn run_batch(
    backend: &dyn InferenceBackend,
    payloads: &[Vec<u8>],
) -> Result<Vec<Prediction>, ClassifierError> {
    let batch = preprocess(payloads, backend.input_size(), backend.layout())?;
    let scores = backend.predict(&batch)?;
    if scores.nrows() != payloads.len() {
        return Err(ClassifierError::Output(format!(
            "expected {} rows, model returned {}",
            payloads.len(),
            scores.nrows()
        )));
    }
    top_predictions(&scores)
}

/// Owns the lazily loaded model and the class map its outputs are read
/// through. The first call to [`ClassifierService::classify`] loads the
/// model; the outcome, success or failure, is kept for the process
/// lifetime.
pub struct ClassifierService {
    loader: Box<dyn BackendLoader>,
    class_map: Arc<ClassMap>,
    backend: OnceCell<Option<Arc<dyn InferenceBackend>>>,
}

impl ClassifierService {
    pub fn new(config: ClassifierConfig, catalog: &ClassMapCatalog) -> Result<Self, ClassMapError> {
        let class_map = catalog.get(config.class_map_name())?.clone();
        log::info!(
            "Classifier uses class map '{}' ({} classes)",
            config.class_map_name(),
            class_map.len()
        );
        Ok(Self::with_loader(Box::new(TractLoader(config)), class_map))
    }

    pub fn with_loader(loader: Box<dyn BackendLoader>, class_map: ClassMap) -> Self {
        Self {
            loader,
            class_map: Arc::new(class_map),
            backend: OnceCell::new(),
        }
    }

    /// Service with an already loaded backend.
    pub fn with_backend(backend: Arc<dyn InferenceBackend>, class_map: ClassMap) -> Self {
        Self {
            loader: Box::new(TractLoader(ClassifierConfig::default())),
            class_map: Arc::new(class_map),
            backend: OnceCell::new_with(Some(Some(backend))),
        }
    }

    /// Service that always reports the classifier as unavailable.
    pub fn disabled(class_map: ClassMap) -> Self {
        Self {
            loader: Box::new(TractLoader(ClassifierConfig::default())),
            class_map: Arc::new(class_map),
            backend: OnceCell::new_with(Some(None)),
        }
    }

    async fn backend(&self) -> Option<Arc<dyn InferenceBackend>> {
        self.backend
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(backend) => Some(backend),
                    Err(ClassifierError::NotConfigured) => {
                        log::info!("No crop doctor model configured; using mock diagnoses");
                        None
                    }
                    Err(e) => {
                        log::error!("Crop doctor model could not be loaded: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// One record per image location, in order.
    pub async fn classify(
        &self,
        store: &dyn ImageStore,
        keys: &[String],
        crop_type: &str,
    ) -> Result<Vec<DiagnosisRecord>, ClassifierError> {
        let backend = self.backend().await.ok_or(ClassifierError::Unavailable)?;

        let mut payloads = Vec::with_capacity(keys.len());
        for key in keys {
            let data = store
                .get(key)
                .await
                .map_err(|source| ClassifierError::Storage {
                    key: key.clone(),
                    source,
                })?;
            payloads.push(data);
        }

        log::debug!(
            "Classifying {} images (crop hint '{}')",
            payloads.len(),
            crop_type
        );
        let predictions = web::block(move || run_batch(backend.as_ref(), &payloads))
            .await
            .map_err(|e| ClassifierError::Blocking(e.to_string()))??;

        predictions
            .into_iter()
            .map(|prediction| {
                self.class_map
                    .resolve(prediction.index)
                    .map(|entry| entry.to_record(prediction.confidence))
                    .ok_or_else(|| {
                        ClassifierError::Output(format!("no class for index {}", prediction.index))
                    })
            })
            .collect()
    }
}
