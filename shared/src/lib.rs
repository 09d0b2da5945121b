use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// A value carried in both English and Kannada.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bilingual<T> {
    pub en: T,
    pub kn: T,
}

pub type BilingualText = Bilingual<String>;
pub type BilingualList = Bilingual<Vec<String>>;

impl BilingualText {
    pub fn new(en: impl Into<String>, kn: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            kn: kn.into(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub immediate: BilingualList,
    pub chemical: BilingualList,
    pub organic: BilingualList,
}

impl Treatment {
    /// Sections in the order they are presented to farmers.
    pub fn sections(&self) -> [(&'static str, &BilingualList); 3] {
        [
            ("immediate", &self.immediate),
            ("chemical", &self.chemical),
            ("organic", &self.organic),
        ]
    }
}

/// One image's diagnosis, as stored inside an analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub disease: BilingualText,
    /// Percentage in `0..=100`, one decimal place.
    pub confidence: f64,
    pub severity: Severity,
    pub cause: BilingualText,
    pub treatment: Treatment,
    pub prevention: BilingualList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub items: Vec<DiagnosisRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn severity_uses_lowercase_names() {
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(Severity::from_str("low").ok(), Some(Severity::Low));
        assert_eq!(
            serde_json::to_string(&Severity::Medium).ok().as_deref(),
            Some("\"medium\"")
        );
    }

    #[test]
    fn empty_result_deserializes_from_empty_object() {
        let result: AnalysisResult = serde_json::from_str("{}").unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn record_serializes_with_nested_bilingual_sections() {
        let record = DiagnosisRecord {
            disease: BilingualText::new("Leaf Spot", "ಎಲೆ ಕಲೆ"),
            confidence: 87.5,
            severity: Severity::Medium,
            cause: BilingualText::new("Fungal spots", "ಕಲೆಗಳು"),
            treatment: Treatment {
                immediate: Bilingual {
                    en: vec!["Remove affected leaves".into()],
                    kn: vec!["ಬಾಧಿತ ಎಲೆಗಳನ್ನು ತೆಗೆದುಹಾಕಿ".into()],
                },
                ..Treatment::default()
            },
            prevention: Bilingual::default(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["disease"]["en"], "Leaf Spot");
        assert_eq!(value["severity"], "medium");
        assert_eq!(value["treatment"]["immediate"]["en"][0], "Remove affected leaves");
        assert_eq!(value["treatment"]["chemical"]["en"].as_array().map(Vec::len), Some(0));
    }
}
