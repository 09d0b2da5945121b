use serde::Deserialize;
use shared::{BilingualList, BilingualText, DiagnosisRecord, Severity, Treatment};
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_CLASS_MAPS: &str = include_str!("../../../config/class_maps.yaml");
/// Catalog format this build understands.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ClassMapError {
    #[error("Unsupported class map catalog version {found} (expected {})", CATALOG_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("Failed to read class map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid class map YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unknown class map: {0}")]
    UnknownMap(String),
    #[error("Class map '{0}' has no classes")]
    Empty(String),
    #[error("Class map '{map}' has no entry for its fallback index {index}")]
    MissingFallback { map: String, index: usize },
    #[error("Class map '{map}' has no '{key}' entry")]
    MissingEntry { map: String, key: String },
}

/// Bilingual metadata attached to one model output class.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassEntry {
    pub key: String,
    #[serde(default)]
    pub severity: Severity,
    pub disease: BilingualText,
    pub cause: BilingualText,
    pub treatment: Treatment,
    pub prevention: BilingualList,
}

impl ClassEntry {
    pub fn to_record(&self, confidence: f64) -> DiagnosisRecord {
        DiagnosisRecord {
            disease: self.disease.clone(),
            confidence,
            severity: self.severity,
            cause: self.cause.clone(),
            treatment: self.treatment.clone(),
            prevention: self.prevention.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassMap {
    pub fallback_index: usize,
    pub classes: BTreeMap<usize, ClassEntry>,
}

impl ClassMap {
    /// Entry for `index`, or the fallback entry when the model emits an
    /// index the map does not know.
    pub fn resolve(&self, index: usize) -> Option<&ClassEntry> {
        self.classes
            .get(&index)
            .or_else(|| self.classes.get(&self.fallback_index))
    }

    pub fn entry_by_key(&self, key: &str) -> Option<&ClassEntry> {
        self.classes.values().find(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassMapCatalog {
    pub version: u32,
    pub maps: BTreeMap<String, ClassMap>,
}

impl ClassMapCatalog {
    pub fn builtin() -> Result<Self, ClassMapError> {
        Self::from_yaml_str(BUILTIN_CLASS_MAPS)
    }

    /// Loads `path` when given, the catalog compiled into the binary otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ClassMapError> {
        match path {
            Some(path) => {
                log::info!("Loading class maps from {}", path.display());
                let contents = std::fs::read_to_string(path)?;
                Self::from_yaml_str(&contents)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ClassMapError> {
        let catalog: ClassMapCatalog = serde_yaml::from_str(contents)?;
        if catalog.version != CATALOG_VERSION {
            return Err(ClassMapError::UnsupportedVersion {
                found: catalog.version,
            });
        }
        for (name, map) in &catalog.maps {
            if map.classes.is_empty() {
                return Err(ClassMapError::Empty(name.clone()));
            }
            if !map.classes.contains_key(&map.fallback_index) {
                return Err(ClassMapError::MissingFallback {
                    map: name.clone(),
                    index: map.fallback_index,
                });
            }
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Result<&ClassMap, ClassMapError> {
        self.maps
            .get(name)
            .ok_or_else(|| ClassMapError::UnknownMap(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_default_and_cassava_maps() {
        let catalog = ClassMapCatalog::builtin().unwrap();
        assert_eq!(catalog.get("default").unwrap().len(), 2);
        assert_eq!(catalog.get("cassava").unwrap().len(), 5);
    }

    #[test]
    fn default_map_entries_match_their_keys() {
        let catalog = ClassMapCatalog::builtin().unwrap();
        let map = catalog.get("default").unwrap();

        let blight = map.resolve(0).unwrap();
        assert_eq!(blight.key, "tomato_late_blight");
        assert_eq!(blight.disease.en, "Tomato Late Blight");
        assert_eq!(blight.severity, Severity::High);
        assert_eq!(blight.treatment.immediate.en.len(), 3);
        assert_eq!(blight.prevention.en.len(), 4);

        let spot = map.resolve(1).unwrap();
        assert_eq!(spot.disease.en, "Leaf Spot");
        assert_eq!(spot.severity, Severity::Medium);
    }

    #[test]
    fn unknown_index_resolves_to_fallback() {
        let catalog = ClassMapCatalog::builtin().unwrap();
        let map = catalog.get("cassava").unwrap();
        assert_eq!(map.resolve(17).unwrap().key, "cassava_brown_streak_disease");
        assert_eq!(map.resolve(4).unwrap().key, "healthy");
        assert!(map.resolve(4).unwrap().treatment.chemical.en.is_empty());
    }

    #[test]
    fn unknown_map_name_is_an_error() {
        let catalog = ClassMapCatalog::builtin().unwrap();
        assert!(matches!(
            catalog.get("wheat"),
            Err(ClassMapError::UnknownMap(name)) if name == "wheat"
        ));
    }

    #[test]
    fn fallback_must_exist() {
        let yaml = r#"
version: 1
maps:
  broken:
    fallback_index: 3
    classes:
      0:
        key: only
        disease: { en: Only, kn: Only }
        cause: { en: c, kn: c }
        treatment:
          immediate: { en: [], kn: [] }
          chemical: { en: [], kn: [] }
          organic: { en: [], kn: [] }
        prevention: { en: [], kn: [] }
"#;
        assert!(matches!(
            ClassMapCatalog::from_yaml_str(yaml),
            Err(ClassMapError::MissingFallback { index: 3, .. })
        ));
    }

    #[test]
    fn unknown_catalog_version_is_rejected() {
        let yaml = BUILTIN_CLASS_MAPS.replacen("version: 1", "version: 2", 1);
        assert!(matches!(
            ClassMapCatalog::from_yaml_str(&yaml),
            Err(ClassMapError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn severity_defaults_to_medium() {
        let yaml = r#"
version: 1
maps:
  tiny:
    fallback_index: 0
    classes:
      0:
        key: rust
        disease: { en: Rust, kn: Rust }
        cause: { en: c, kn: c }
        treatment:
          immediate: { en: [], kn: [] }
          chemical: { en: [], kn: [] }
          organic: { en: [], kn: [] }
        prevention: { en: [], kn: [] }
"#;
        let catalog = ClassMapCatalog::from_yaml_str(yaml).unwrap();
        let entry = catalog.get("tiny").unwrap().resolve(0).unwrap();
        assert_eq!(entry.severity, Severity::Medium);
        assert_eq!(entry.to_record(55.5).confidence, 55.5);
    }
}
