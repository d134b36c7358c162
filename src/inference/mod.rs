//! Inference module for crop disease prediction
//!
//! This module provides:
//! - Image decoding and preprocessing to the classifier's input shape
//! - The `CropClassifier` trait and its Burn implementation
//! - Arg-max resolution with the out-of-bounds label guard

pub mod classifier;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use classifier::{BurnClassifier, CropClassifier};
pub use predictor::{predict_bytes, resolve_prediction, Prediction, UNKNOWN_CLASS_LABEL};
pub use preprocess::{decode_image, preprocess, target_size, ImageTensor, FALLBACK_INPUT_SIZE};
