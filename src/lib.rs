//! # CropScan
//!
//! Multi-crop plant disease classification built on the Burn framework.
//!
//! One pre-trained classifier per crop is loaded at startup into an immutable
//! registry; images are decoded, resized to the classifier's input shape and
//! classified into that crop's disease labels.
//!
//! ## Modules
//!
//! - `model`: Architecture descriptors, backbones (MobileNetV2, EfficientNet,
//!   EfficientNetV2, plain CNN), classifier heads and weight loading
//! - `registry`: Crop catalog, per-crop loading and the model registry
//! - `inference`: Preprocessing, the classifier trait and prediction
//! - `backend`: Compile-time backend selection (NdArray or CUDA)
//! - `utils`: Error types and logging setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cropscan::registry::{load_builtin_models, CropCatalog};
//! use cropscan::inference::predict_bytes;
//!
//! let (registry, _report) = load_builtin_models("model".as_ref(), &CropCatalog::builtin())?;
//! let entry = registry.get("tomato").unwrap();
//! let prediction = predict_bytes("tomato", entry, &std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.2})", prediction.label, prediction.confidence);
//! ```

pub mod backend;
pub mod inference;
pub mod model;
pub mod registry;
pub mod utils;

// Re-export commonly used items for convenience
pub use inference::{predict_bytes, CropClassifier, ImageTensor, Prediction, UNKNOWN_CLASS_LABEL};
pub use model::{ArchitectureDescriptor, CropNet};
pub use registry::{
    load_all_models, load_builtin_models, CropCatalog, CropModelEntry, CropSpec, LoadReport,
    ModelRegistry,
};
pub use utils::error::{CropScanError, Result};

/// Default directory holding weight files and descriptors
pub const DEFAULT_MODELS_DIR: &str = "model";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
