use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5";
const PLACEHOLDER_API_KEY: &str = "your-api-key";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Memory,
    DynamoDb {
        farmers_table: String,
        analyses_table: String,
        images_table: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageStoreKind {
    Local { root: PathBuf, url_prefix: String },
    S3 { bucket: String },
}

/// Where the crop classifier comes from and how its output is labelled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierConfig {
    /// URL of a hosted ONNX model. Takes priority over `model_path`.
    pub model_handle: Option<String>,
    pub model_path: Option<PathBuf>,
    /// Explicit class map name; inferred from the handle when unset.
    pub class_map: Option<String>,
    pub class_maps_file: Option<PathBuf>,
    pub model_cache_dir: PathBuf,
}

impl ClassifierConfig {
    pub fn class_map_name(&self) -> &str {
        if let Some(name) = &self.class_map {
            return name;
        }
        match &self.model_handle {
            Some(handle) if handle.to_lowercase().contains("cassava") => "cassava",
            _ => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherConfig {
    /// `None` when unset or still the `.env` template placeholder.
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENWEATHER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    pub image_store: ImageStoreKind,
    pub max_image_bytes: usize,
    pub classifier: ClassifierConfig,
    pub weather: WeatherConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset, the way `.env` templates leave them.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let storage = match get("STORAGE_BACKEND").as_deref() {
            None | Some("memory") => StorageBackend::Memory,
            Some("dynamodb") => StorageBackend::DynamoDb {
                farmers_table: get("DYNAMODB_FARMERS_TABLE")
                    .ok_or(ConfigError::Missing("DYNAMODB_FARMERS_TABLE"))?,
                analyses_table: get("DYNAMODB_ANALYSES_TABLE")
                    .ok_or(ConfigError::Missing("DYNAMODB_ANALYSES_TABLE"))?,
                images_table: get("DYNAMODB_ANALYSIS_IMAGES_TABLE")
                    .ok_or(ConfigError::Missing("DYNAMODB_ANALYSIS_IMAGES_TABLE"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let image_store = match get("IMAGE_STORE").as_deref() {
            None | Some("local") => ImageStoreKind::Local {
                root: PathBuf::from(get("MEDIA_ROOT").unwrap_or_else(|| "media".to_string())),
                url_prefix: get("MEDIA_URL").unwrap_or_else(|| "/media".to_string()),
            },
            Some("s3") => ImageStoreKind::S3 {
                bucket: get("S3_BUCKET_NAME").ok_or(ConfigError::Missing("S3_BUCKET_NAME"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "IMAGE_STORE",
                    value: other.to_string(),
                });
            }
        };

        let max_image_bytes = match get("MAX_IMAGE_BYTES") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_IMAGE_BYTES",
                value: raw,
            })?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        let classifier = ClassifierConfig {
            model_handle: get("CROP_DOCTOR_MODEL_HANDLE"),
            model_path: get("CROP_DOCTOR_MODEL_PATH").map(PathBuf::from),
            class_map: get("CROP_DOCTOR_CLASS_MAP"),
            class_maps_file: get("CROP_DOCTOR_CLASS_MAPS_FILE").map(PathBuf::from),
            model_cache_dir: get("CROP_DOCTOR_MODEL_CACHE")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("kisan-sathi-models")),
        };

        let weather = WeatherConfig {
            api_key: get("OPENWEATHER_API_KEY").filter(|key| key != PLACEHOLDER_API_KEY),
            base_url: get("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_URL.to_string()),
        };

        Ok(Self {
            port,
            jwt_secret,
            storage,
            image_store,
            max_image_bytes,
            classifier,
            weather,
        })
    }
}
