//! Model module for crop classifier architectures using the Burn framework
//!
//! This module provides:
//! - Architecture descriptors (serialisable topology definitions)
//! - Backbones: MobileNetV2, EfficientNet B0-B7, EfficientNetV2 B0-B3, plain CNN
//! - Classifier heads: dense, dropout, batch norm, channel attention
//! - Weight loading with per-layer shape verification

pub mod backbone;
pub mod blocks;
pub mod classifier;
pub mod descriptor;
pub mod head;
pub mod shapes;

// Re-export main types for convenience
pub use backbone::Backbone;
pub use classifier::{load_crop_net, save_crop_net, weights_file, CropNet};
pub use descriptor::{
    descriptor_path, Activation, ArchitectureDescriptor, BackboneKind, EfficientNetV2Variant,
    EfficientNetVariant, HeadLayer, InputShape, OutputLayer, MAX_INPUT_SIDE,
};
pub use shapes::LayerShape;
