//! Crop catalog
//!
//! The built-in catalog lists the four supported crops with their weight
//! stems, label order and default topologies. A JSON catalog file can replace
//! it wholesale.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{
    Activation, ArchitectureDescriptor, BackboneKind, EfficientNetV2Variant, EfficientNetVariant,
    HeadLayer, InputShape, OutputLayer,
};
use crate::utils::error::{CropScanError, Result};

/// How loudly a load failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CropSeverity {
    /// Failure is logged as an error
    Critical,
    /// Failure is logged as a warning
    #[default]
    Placeholder,
}

/// One crop the service may serve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSpec {
    /// URL key, e.g. `tomato`
    pub crop: String,
    /// Weight file stem inside the models directory (no extension)
    pub weights: String,
    /// Ordered class labels
    pub labels: Vec<String>,
    #[serde(default)]
    pub severity: CropSeverity,
    /// Topology used when no sidecar descriptor exists
    pub architecture: ArchitectureDescriptor,
}

impl CropSpec {
    pub fn is_critical(&self) -> bool {
        self.severity == CropSeverity::Critical
    }
}

/// Ordered list of crops to load at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropCatalog {
    pub crops: Vec<CropSpec>,
}

fn dense(name: &str, units: usize) -> HeadLayer {
    HeadLayer::Dense {
        name: name.to_string(),
        units,
        activation: Activation::Relu,
    }
}

fn dropout(rate: f64) -> HeadLayer {
    HeadLayer::Dropout { rate }
}

fn output(name: &str, classes: usize) -> OutputLayer {
    OutputLayer {
        name: name.to_string(),
        classes,
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl CropCatalog {
    /// Tomato, maize, cashew and cassava
    pub fn builtin() -> Self {
        let tomato = CropSpec {
            crop: "tomato".to_string(),
            weights: "tomato_mobilenet_best".to_string(),
            labels: labels(&[
                "Tomato_Bacterial_spot",
                "Tomato_Early_blight",
                "Tomato_Healthy",
                "Tomato_Late_blight",
                "Tomato_Leaf_Mold",
            ]),
            severity: CropSeverity::Critical,
            architecture: ArchitectureDescriptor {
                input: InputShape::square(224),
                backbone: BackboneKind::MobileNetV2 { alpha: 1.0 },
                head: vec![
                    dense("previous_dense_layer", 768),
                    dense("dense", 384),
                    dropout(0.3),
                ],
                output: output("output_layer", 5),
            },
        };

        let maize = CropSpec {
            crop: "maize".to_string(),
            weights: "maize_best_final".to_string(),
            labels: labels(&[
                "fall armyworm",
                "grasshopper",
                "healthy",
                "leaf beetle",
                "leaf blight",
                "leaf spot",
                "streak virus",
            ]),
            severity: CropSeverity::Critical,
            architecture: ArchitectureDescriptor {
                input: InputShape::square(256),
                backbone: BackboneKind::EfficientNet {
                    variant: EfficientNetVariant::B4,
                },
                head: vec![
                    HeadLayer::BatchNorm {
                        name: "feature_bn".to_string(),
                    },
                    HeadLayer::ChannelAttention {
                        name: "attention".to_string(),
                        hidden_units: 512,
                        dropout: 0.3,
                    },
                    dense("classifier_dense_1", 1024),
                    dropout(0.5),
                    HeadLayer::BatchNorm {
                        name: "classifier_bn".to_string(),
                    },
                    dense("classifier_dense_2", 512),
                    dropout(0.3),
                ],
                output: output("maize_output_layer", 7),
            },
        };

        let cashew = CropSpec {
            crop: "cashew".to_string(),
            weights: "cashew_model".to_string(),
            labels: labels(&["Cashew_Healthy", "Cashew_Anthracnose", "Cashew_TeaMosquitoBug"]),
            severity: CropSeverity::Placeholder,
            architecture: ArchitectureDescriptor {
                input: InputShape::square(224),
                backbone: BackboneKind::MobileNetV2 { alpha: 1.0 },
                head: vec![dense("cashew_hidden_dense", 256), dropout(0.2)],
                output: output("cashew_output_layer", 3),
            },
        };

        let cassava = CropSpec {
            crop: "cassava".to_string(),
            weights: "cassava_model".to_string(),
            labels: labels(&[
                "Cassava_Healthy",
                "Cassava_Bacterial_Blight",
                "Cassava_Brown_Streak_Disease",
                "Cassava_Green_Mottle",
            ]),
            severity: CropSeverity::Placeholder,
            architecture: ArchitectureDescriptor {
                input: InputShape::square(224),
                backbone: BackboneKind::EfficientNetV2 {
                    variant: EfficientNetV2Variant::B3,
                },
                head: vec![dense("cassava_hidden_dense", 128)],
                output: output("cassava_output_layer", 4),
            },
        };

        Self {
            crops: vec![tomato, maize, cashew, cassava],
        }
    }

    /// Load and validate a catalog from JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Crop keys must be unique and non-empty; every topology must be valid
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.crops {
            if spec.crop.trim().is_empty() {
                return Err(CropScanError::Config("crop key must not be empty".to_string()));
            }
            if spec.weights.trim().is_empty() {
                return Err(CropScanError::Config(format!(
                    "crop '{}' has an empty weights stem",
                    spec.crop
                )));
            }
            if !seen.insert(spec.crop.as_str()) {
                return Err(CropScanError::Config(format!(
                    "crop '{}' is listed more than once",
                    spec.crop
                )));
            }
            spec.architecture.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, crop: &str) -> Option<&CropSpec> {
        self.crops.iter().find(|spec| spec.crop == crop)
    }
}

impl Default for CropCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_catalog() {
        let catalog = CropCatalog::builtin();
        assert!(catalog.validate().is_ok());

        let keys: Vec<_> = catalog.crops.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(keys, vec!["tomato", "maize", "cashew", "cassava"]);

        for spec in &catalog.crops {
            assert_eq!(spec.labels.len(), spec.architecture.output.classes);
        }
        assert!(catalog.get("tomato").unwrap().is_critical());
        assert!(catalog.get("maize").unwrap().is_critical());
        assert!(!catalog.get("cashew").unwrap().is_critical());
        assert_eq!(catalog.get("maize").unwrap().architecture.input, InputShape::square(256));
    }

    #[test]
    fn test_duplicate_crop_rejected() {
        let mut catalog = CropCatalog::builtin();
        let dup = catalog.crops[0].clone();
        catalog.crops.push(dup);
        assert!(matches!(catalog.validate(), Err(CropScanError::Config(_))));
    }

    #[test]
    fn test_catalog_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = CropCatalog::builtin();
        catalog.crops.truncate(1);
        catalog.save(&path).unwrap();

        let loaded = CropCatalog::from_file(&path).unwrap();
        assert_eq!(loaded, catalog);
    }

    #[test]
    fn test_severity_defaults_to_placeholder() {
        let json = r#"{"crops": [{
            "crop": "banana",
            "weights": "banana_model",
            "labels": ["a", "b"],
            "architecture": {
                "input": {"height": 64, "width": 64},
                "backbone": {"kind": "plain_cnn", "base_filters": 8},
                "output": {"name": "out", "classes": 2}
            }
        }]}"#;
        let catalog: CropCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.crops[0].severity, CropSeverity::Placeholder);
        assert!(catalog.validate().is_ok());
    }
}
