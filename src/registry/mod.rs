//! Crop model registry
//!
//! This module provides:
//! - The crop catalog (crop key, weight stem, labels, default topology)
//! - The immutable registry of successfully loaded classifiers
//! - Startup loading with per-crop outcomes and a load report

pub mod catalog;
pub mod loader;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::inference::CropClassifier;

pub use catalog::{CropCatalog, CropSeverity, CropSpec};
pub use loader::{
    load_all_models, load_builtin_models, load_crop, resolve_descriptor, CropLoadStatus,
    LoadOutcome, LoadReport,
};

/// A loaded classifier together with its ordered labels
///
/// `labels[i]` names output index `i` of the classifier.
#[derive(Clone)]
pub struct CropModelEntry {
    pub classifier: Arc<dyn CropClassifier>,
    pub labels: Vec<String>,
}

impl CropModelEntry {
    pub fn new(classifier: Arc<dyn CropClassifier>, labels: Vec<String>) -> Self {
        Self { classifier, labels }
    }

    /// True when every output index has a label
    pub fn labels_match_output(&self) -> bool {
        self.labels.len() == self.classifier.output_width()
    }
}

impl fmt::Debug for CropModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CropModelEntry")
            .field("input_shape", &self.classifier.input_shape())
            .field("output_width", &self.classifier.output_width())
            .field("labels", &self.labels)
            .finish()
    }
}

/// Crop key -> loaded classifier; crops that failed to load are absent
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, CropModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, CropModelEntry)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, crop: impl Into<String>, entry: CropModelEntry) {
        self.entries.insert(crop.into(), entry);
    }

    pub fn get(&self, crop: &str) -> Option<&CropModelEntry> {
        self.entries.get(crop)
    }

    pub fn contains(&self, crop: &str) -> bool {
        self.entries.contains_key(crop)
    }

    /// Loaded crop keys in sorted order
    pub fn available_models(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
