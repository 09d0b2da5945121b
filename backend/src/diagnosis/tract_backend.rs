use actix_web::web;
use ::ndarray::{Array2, Array4, ArrayView4, Axis};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;

use super::classifier::{
    scores_from_shape, ClassifierError, InferenceBackend, Layout, DEFAULT_INPUT_SIZE,
};
use crate::config::ClassifierConfig;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

type Plan = TypedRunnableModel<TypedModel>;

/// ONNX image classifier executed in-process.
pub struct TractBackend {
    plan: Plan,
    input_size: u32,
    layout: Layout,
    single_batch: bool,
}

/// Input geometry read from a model's first input shape. `None` marks a
/// symbolic dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputGeometry {
    pub input_size: u32,
    pub layout: Layout,
    pub single_batch: bool,
}

impl InputGeometry {
    pub(crate) fn from_dims(dims: &[Option<usize>]) -> Self {
        let single_batch = dims.first() == Some(&Some(1));
        let (layout, side) = match dims {
            [_, Some(3), h, _] => (Layout::Nchw, *h),
            [_, h, _, Some(3)] => (Layout::Nhwc, *h),
            _ => (Layout::Nchw, None),
        };
        let input_size = side
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(DEFAULT_INPUT_SIZE);
        Self {
            input_size,
            layout,
            single_batch,
        }
    }
}

impl TractBackend {
    pub fn from_path(path: &Path) -> Result<Self, ClassifierError> {
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_typed())
            .map_err(|e| ClassifierError::Load(format!("{}: {}", path.display(), e)))?;

        let fact = model
            .input_fact(0)
            .map_err(|e| ClassifierError::Load(e.to_string()))?;
        let dims: Vec<Option<usize>> = fact.shape.iter().map(|d| d.to_usize().ok()).collect();
        let geometry = InputGeometry::from_dims(&dims);

        let plan = model
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(|e| ClassifierError::Load(e.to_string()))?;

        log::info!(
            "Loaded ONNX model {} (input {}x{}, {:?}, single batch: {})",
            path.display(),
            geometry.input_size,
            geometry.input_size,
            geometry.layout,
            geometry.single_batch
        );

        Ok(Self {
            plan,
            input_size: geometry.input_size,
            layout: geometry.layout,
            single_batch: geometry.single_batch,
        })
    }

    fn run(&self, input: ArrayView4<f32>) -> Result<Array2<f32>, ClassifierError> {
        let shape = input.shape().to_vec();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(&shape, &data)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| ClassifierError::Output("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::Output(e.to_string()))?;

        scores_from_shape(view.shape(), view.iter().copied().collect())
    }
}

impl InferenceBackend for TractBackend {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn layout(&self) -> Layout {
        self.layout
    }

    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ClassifierError> {
        if !self.single_batch || batch.len_of(Axis(0)) <= 1 {
            return self.run(batch.view());
        }

        let mut rows = Vec::with_capacity(batch.len_of(Axis(0)));
        for image in batch.axis_iter(Axis(0)) {
            rows.push(self.run(image.insert_axis(Axis(0)))?);
        }
        let views: Vec<_> = rows.iter().map(|row| row.view()).collect();
        ::ndarray::concatenate(Axis(0), &views).map_err(|e| ClassifierError::Output(e.to_string()))
    }
}

/// Cache location of a hosted model, keyed by the SHA-256 of its handle.
pub(crate) fn cached_model_path(cache_dir: &Path, handle: &str) -> PathBuf {
    let digest = hex::encode(Sha256::digest(handle.as_bytes()));
    cache_dir.join(format!("{}.onnx", digest))
}

async fn download_model(handle: &str, path: &Path) -> Result<(), ClassifierError> {
    let download = |e: reqwest::Error| ClassifierError::Download(e.to_string());

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(download)?;
    let response = client
        .get(handle)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(download)?;
    let bytes = response.bytes().await.map_err(download)?;

    let io = |e: std::io::Error| ClassifierError::Download(e.to_string());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }
    let partial = path.with_extension("onnx.part");
    tokio::fs::write(&partial, &bytes).await.map_err(io)?;
    tokio::fs::rename(&partial, path).await.map_err(io)?;

    log::info!("Downloaded {} bytes from {} to {}", bytes.len(), handle, path.display());
    Ok(())
}

/// Local path of the configured model, downloading a hosted one first when
/// it is not cached yet. The handle wins over the local path.
pub async fn resolve_model_path(config: &ClassifierConfig) -> Result<PathBuf, ClassifierError> {
    if let Some(handle) = &config.model_handle {
        let scheme = url::Url::parse(handle).map(|url| url.scheme().to_string());
        if !matches!(scheme.as_deref(), Ok("http") | Ok("https")) {
            return Err(ClassifierError::Load(format!(
                "unsupported model handle '{}'",
                handle
            )));
        }
        let path = cached_model_path(&config.model_cache_dir, handle);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::info!("Fetching crop doctor model from {}", handle);
            download_model(handle, &path).await?;
        }
        return Ok(path);
    }

    config
        .model_path
        .clone()
        .ok_or(ClassifierError::NotConfigured)
}

pub async fn load(config: &ClassifierConfig) -> Result<TractBackend, ClassifierError> {
    let path = resolve_model_path(config).await?;
    web::block(move || TractBackend::from_path(&path))
        .await
        .map_err(|e| ClassifierError::Blocking(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nchw_and_nhwc_geometry() {
        let nchw = InputGeometry::from_dims(&[None, Some(3), Some(299), Some(299)]);
        assert_eq!(nchw.layout, Layout::Nchw);
        assert_eq!(nchw.input_size, 299);
        assert!(!nchw.single_batch);

        let nhwc = InputGeometry::from_dims(&[Some(1), Some(192), Some(192), Some(3)]);
        assert_eq!(nhwc.layout, Layout::Nhwc);
        assert_eq!(nhwc.input_size, 192);
        assert!(nhwc.single_batch);
    }

    #[test]
    fn symbolic_sizes_fall_back_to_default() {
        let geometry = InputGeometry::from_dims(&[None, Some(3), None, None]);
        assert_eq!(geometry.input_size, DEFAULT_INPUT_SIZE);

        let odd = InputGeometry::from_dims(&[Some(1), Some(10)]);
        assert_eq!(odd.layout, Layout::Nchw);
        assert_eq!(odd.input_size, DEFAULT_INPUT_SIZE);
    }

    #[test]
    fn cache_path_is_stable_per_handle() {
        let dir = Path::new("/tmp/models");
        let a = cached_model_path(dir, "https://example.com/cassava.onnx");
        let b = cached_model_path(dir, "https://example.com/cassava.onnx");
        let c = cached_model_path(dir, "https://example.com/other.onnx");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("onnx"));
        assert_eq!(a.file_stem().map(|s| s.len()), Some(64));
    }

    #[actix_web::test]
    async fn nothing_configured_is_not_configured() {
        let result = resolve_model_path(&ClassifierConfig::default()).await;
        assert!(matches!(result, Err(ClassifierError::NotConfigured)));
    }

    #[actix_web::test]
    async fn local_path_is_used_when_no_handle() {
        let config = ClassifierConfig {
            model_path: Some(PathBuf::from("/models/crop.onnx")),
            ..Default::default()
        };
        let path = resolve_model_path(&config).await.unwrap();
        assert_eq!(path, PathBuf::from("/models/crop.onnx"));
    }

    #[actix_web::test]
    async fn cached_handle_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let handle = "https://models.invalid/cassava.onnx";
        let cached = cached_model_path(dir.path(), handle);
        std::fs::write(&cached, b"onnx").unwrap();

        let config = ClassifierConfig {
            model_handle: Some(handle.to_string()),
            model_path: Some(PathBuf::from("/ignored.onnx")),
            model_cache_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(resolve_model_path(&config).await.unwrap(), cached);
    }

    #[actix_web::test]
    async fn non_url_handle_fails_to_load() {
        let config = ClassifierConfig {
            model_handle: Some("kaggle/cassava".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_model_path(&config).await,
            Err(ClassifierError::Load(_))
        ));
    }

    #[actix_web::test]
    async fn missing_model_file_fails_to_load() {
        let config = ClassifierConfig {
            model_path: Some(PathBuf::from("/definitely/not/here.onnx")),
            ..Default::default()
        };
        assert!(matches!(load(&config).await, Err(ClassifierError::Load(_))));
    }
}
