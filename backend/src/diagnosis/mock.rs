use shared::DiagnosisRecord;

use super::class_map::{ClassEntry, ClassMapCatalog, ClassMapError};

pub const MOCK_CONFIDENCE: f64 = 92.0;

const MOCK_MAP: &str = "default";
const TOMATO_KEY: &str = "tomato_late_blight";
const GENERIC_KEY: &str = "leaf_spot";

/// Stand-in diagnoses used whenever no classifier is available. Output
/// depends only on the image count and the crop hint.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    tomato: ClassEntry,
    generic: ClassEntry,
}

impl MockGenerator {
    pub fn from_catalog(catalog: &ClassMapCatalog) -> Result<Self, ClassMapError> {
        let map = catalog.get(MOCK_MAP)?;
        let entry = |key: &str| {
            map.entry_by_key(key)
                .cloned()
                .ok_or_else(|| ClassMapError::MissingEntry {
                    map: MOCK_MAP.to_string(),
                    key: key.to_string(),
                })
        };
        Ok(Self {
            tomato: entry(TOMATO_KEY)?,
            generic: entry(GENERIC_KEY)?,
        })
    }

    pub fn generate(&self, count: usize, crop_type: &str) -> Vec<DiagnosisRecord> {
        let entry = if crop_type.to_lowercase().contains("tomato") {
            &self.tomato
        } else {
            &self.generic
        };
        (0..count).map(|_| entry.to_record(MOCK_CONFIDENCE)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Severity;

    fn generator() -> MockGenerator {
        MockGenerator::from_catalog(&ClassMapCatalog::builtin().unwrap()).unwrap()
    }

    #[test]
    fn tomato_hint_gives_late_blight() {
        let records = generator().generate(2, "Cherry TOMATO");
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.disease.en, "Tomato Late Blight");
            assert_eq!(record.confidence, 92.0);
            assert_eq!(record.severity, Severity::High);
        }
    }

    #[test]
    fn other_crops_give_leaf_spot_with_matching_translation() {
        let records = generator().generate(3, "ragi");
        assert_eq!(records.len(), 3);
        let catalog = ClassMapCatalog::builtin().unwrap();
        let spot = catalog.get("default").unwrap().entry_by_key("leaf_spot").unwrap();
        for record in &records {
            assert_eq!(record.disease.en, "Leaf Spot");
            assert_eq!(record.disease.kn, spot.disease.kn);
            assert_eq!(record.severity, Severity::Medium);
        }
    }

    #[test]
    fn zero_count_is_empty() {
        assert!(generator().generate(0, "tomato").is_empty());
    }

    #[test]
    fn catalog_without_default_map_is_rejected() {
        let yaml = r#"
version: 1
maps:
  other:
    fallback_index: 0
    classes:
      0:
        key: leaf_spot
        disease: { en: Leaf Spot, kn: x }
        cause: { en: c, kn: c }
        treatment:
          immediate: { en: [], kn: [] }
          chemical: { en: [], kn: [] }
          organic: { en: [], kn: [] }
        prevention: { en: [], kn: [] }
"#;
        let catalog = ClassMapCatalog::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            MockGenerator::from_catalog(&catalog),
            Err(ClassMapError::UnknownMap(_))
        ));
    }
}
