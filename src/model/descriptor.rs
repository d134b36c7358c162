//! Architecture descriptors
//!
//! A descriptor is the serialisable definition of a classifier topology. It is
//! persisted as `<weights-stem>.arch.json` next to the weight file so that the
//! network that reads a weight file is always the one that wrote it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{CropScanError, Result};

/// File suffix for descriptor sidecars
pub const DESCRIPTOR_SUFFIX: &str = ".arch.json";

/// Largest declared input side accepted from a descriptor
pub const MAX_INPUT_SIDE: usize = 4096;

/// Declared input resolution of a classifier; either side may be unspecified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: Option<usize>,
    pub width: Option<usize>,
}

impl InputShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height: Some(height),
            width: Some(width),
        }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn unspecified() -> Self {
        Self {
            height: None,
            width: None,
        }
    }

    /// `(height, width)` when both sides are declared
    pub fn resolved(&self) -> Option<(usize, usize)> {
        match (self.height, self.width) {
            (Some(h), Some(w)) if h > 0 && w > 0 => Some((h, w)),
            _ => None,
        }
    }
}

/// Element-wise activation used by convolutional and dense layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Relu6,
    Swish,
    Sigmoid,
}

/// EfficientNet compound-scaling variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfficientNetVariant {
    B0,
    B1,
    B2,
    B3,
    B4,
    B5,
    B6,
    B7,
}

impl EfficientNetVariant {
    /// `(width_coefficient, depth_coefficient)`
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            Self::B0 => (1.0, 1.0),
            Self::B1 => (1.0, 1.1),
            Self::B2 => (1.1, 1.2),
            Self::B3 => (1.2, 1.4),
            Self::B4 => (1.4, 1.8),
            Self::B5 => (1.6, 2.2),
            Self::B6 => (1.8, 2.6),
            Self::B7 => (2.0, 3.1),
        }
    }
}

/// EfficientNetV2 B-series variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfficientNetV2Variant {
    B0,
    B1,
    B2,
    B3,
}

impl EfficientNetV2Variant {
    /// `(width_coefficient, depth_coefficient)`
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            Self::B0 => (1.0, 1.0),
            Self::B1 => (1.0, 1.1),
            Self::B2 => (1.1, 1.2),
            Self::B3 => (1.2, 1.4),
        }
    }
}

/// Feature-extractor family and its scaling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackboneKind {
    /// MobileNetV2 with width multiplier `alpha`
    MobileNetV2 { alpha: f64 },
    /// EfficientNet (MBConv + squeeze-excitation)
    EfficientNet { variant: EfficientNetVariant },
    /// EfficientNetV2 (Fused-MBConv early stages, MBConv later)
    EfficientNetV2 { variant: EfficientNetV2Variant },
    /// Four conv/batch-norm/max-pool blocks, doubling filters each block
    PlainCnn { base_filters: usize },
}

/// One layer of the classifier head, applied after global average pooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeadLayer {
    Dense {
        name: String,
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
    Dropout {
        rate: f64,
    },
    BatchNorm {
        name: String,
    },
    /// Gating block: `x * sigmoid(dense(dropout(relu(dense(x)))))`
    ChannelAttention {
        name: String,
        hidden_units: usize,
        #[serde(default)]
        dropout: f64,
    },
}

/// Final softmax layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayer {
    pub name: String,
    pub classes: usize,
}

/// Full classifier topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    pub input: InputShape,
    pub backbone: BackboneKind,
    #[serde(default)]
    pub head: Vec<HeadLayer>,
    pub output: OutputLayer,
}

impl ArchitectureDescriptor {
    /// Check that every size and rate is usable before building a network
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CropScanError::Descriptor(msg));

        for (side, value) in [("height", self.input.height), ("width", self.input.width)] {
            if let Some(value) = value.filter(|v| *v > MAX_INPUT_SIDE) {
                return invalid(format!(
                    "input {} {} exceeds the maximum of {}",
                    side, value, MAX_INPUT_SIDE
                ));
            }
        }

        if self.output.classes == 0 {
            return invalid(format!(
                "output layer '{}' must have at least one class",
                self.output.name
            ));
        }

        match &self.backbone {
            BackboneKind::MobileNetV2 { alpha } if !(*alpha > 0.0) => {
                return invalid(format!("MobileNetV2 alpha must be positive, got {}", alpha));
            }
            BackboneKind::PlainCnn { base_filters: 0 } => {
                return invalid("PlainCnn base_filters must be positive".to_string());
            }
            _ => {}
        }

        for layer in &self.head {
            match layer {
                HeadLayer::Dense { name, units: 0, .. } => {
                    return invalid(format!("dense layer '{}' has zero units", name));
                }
                HeadLayer::ChannelAttention {
                    name,
                    hidden_units: 0,
                    ..
                } => {
                    return invalid(format!("attention block '{}' has zero hidden units", name));
                }
                HeadLayer::Dropout { rate } if !(0.0..1.0).contains(rate) => {
                    return invalid(format!("dropout rate {} outside [0, 1)", rate));
                }
                HeadLayer::ChannelAttention { name, dropout, .. }
                    if !(0.0..1.0).contains(dropout) =>
                {
                    return invalid(format!(
                        "attention block '{}' dropout {} outside [0, 1)",
                        name, dropout
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Read a descriptor from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let descriptor: Self = serde_json::from_str(&json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Write the descriptor as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Sidecar path for the weights with the given stem
pub fn descriptor_path(models_dir: &Path, weights_stem: &str) -> PathBuf {
    models_dir.join(format!("{}{}", weights_stem, DESCRIPTOR_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ArchitectureDescriptor {
        ArchitectureDescriptor {
            input: InputShape::square(224),
            backbone: BackboneKind::MobileNetV2 { alpha: 1.0 },
            head: vec![
                HeadLayer::Dense {
                    name: "hidden".to_string(),
                    units: 64,
                    activation: Activation::Relu,
                },
                HeadLayer::Dropout { rate: 0.3 },
            ],
            output: OutputLayer {
                name: "out".to_string(),
                classes: 5,
            },
        }
    }

    #[test]
    fn test_input_shape_resolution() {
        assert_eq!(InputShape::new(256, 224).resolved(), Some((256, 224)));
        assert_eq!(InputShape::unspecified().resolved(), None);
        let half = InputShape {
            height: Some(224),
            width: None,
        };
        assert_eq!(half.resolved(), None);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let mut descriptor = sample();
        assert!(descriptor.validate().is_ok());

        descriptor.output.classes = 0;
        assert!(descriptor.validate().is_err());

        let mut descriptor = sample();
        descriptor.head.push(HeadLayer::Dropout { rate: 1.5 });
        assert!(descriptor.validate().is_err());

        let mut descriptor = sample();
        descriptor.backbone = BackboneKind::MobileNetV2 { alpha: 0.0 };
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_input_sides() {
        let mut descriptor = sample();
        descriptor.input = InputShape::new(100_000, 224);
        match descriptor.validate() {
            Err(CropScanError::Descriptor(msg)) => assert!(msg.contains("height 100000")),
            other => panic!("unexpected result: {:?}", other),
        }

        descriptor.input = InputShape::new(224, MAX_INPUT_SIDE + 1);
        assert!(descriptor.validate().is_err());

        descriptor.input = InputShape::square(MAX_INPUT_SIDE);
        assert!(descriptor.validate().is_ok());

        // Undeclared sides fall back at preprocessing time
        descriptor.input = InputShape::unspecified();
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_sidecar_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = descriptor_path(dir.path(), "tomato_mobilenet_best");
        assert!(path.ends_with("tomato_mobilenet_best.arch.json"));

        let descriptor = sample();
        descriptor.save(&path).unwrap();
        let loaded = ArchitectureDescriptor::from_file(&path).unwrap();
        assert_eq!(loaded, descriptor);
    }

    #[test]
    fn test_json_layout() {
        let json = r#"{
            "input": {"height": 256, "width": 256},
            "backbone": {"kind": "efficient_net", "variant": "B4"},
            "head": [
                {"type": "batch_norm", "name": "bn"},
                {"type": "channel_attention", "name": "attention", "hidden_units": 512, "dropout": 0.3},
                {"type": "dense", "name": "fc", "units": 32, "activation": "relu"}
            ],
            "output": {"name": "maize_output_layer", "classes": 7}
        }"#;
        let descriptor: ArchitectureDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(
            descriptor.backbone,
            BackboneKind::EfficientNet {
                variant: EfficientNetVariant::B4
            }
        );
        assert_eq!(descriptor.head.len(), 3);
        assert!(descriptor.validate().is_ok());
    }
}
