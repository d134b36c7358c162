//! Startup model loading
//!
//! Each crop is loaded independently; a failure removes only that crop. The
//! registry is returned together with a report of every outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::catalog::{CropCatalog, CropSpec};
use super::{CropModelEntry, ModelRegistry};
use crate::backend::{default_device, InferenceBackend};
use crate::inference::{BurnClassifier, CropClassifier};
use crate::model::{descriptor_path, load_crop_net, weights_file, ArchitectureDescriptor};
use crate::utils::error::{CropScanError, Result};

/// Result of loading one crop
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(CropModelEntry),
    Failed(CropScanError),
}

/// Per-crop load status kept after startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropLoadStatus {
    pub crop: String,
    pub loaded: bool,
    pub weights: PathBuf,
    pub labels: Vec<String>,
    pub input_height: Option<usize>,
    pub input_width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of every crop in catalog order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub crops: Vec<CropLoadStatus>,
}

impl LoadReport {
    pub fn loaded(&self) -> impl Iterator<Item = &CropLoadStatus> {
        self.crops.iter().filter(|c| c.loaded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CropLoadStatus> {
        self.crops.iter().filter(|c| !c.loaded)
    }
}

/// Topology for a crop: the sidecar descriptor if present, else the built-in one
pub fn resolve_descriptor(models_dir: &Path, spec: &CropSpec) -> Result<ArchitectureDescriptor> {
    let sidecar = descriptor_path(models_dir, &spec.weights);
    if sidecar.exists() {
        debug!("{}: using descriptor {}", spec.crop, sidecar.display());
        ArchitectureDescriptor::from_file(&sidecar).map_err(|e| {
            CropScanError::Descriptor(format!("{}: {}", sidecar.display(), e))
        })
    } else {
        debug!(
            "{}: no descriptor at {}, using built-in topology",
            spec.crop,
            sidecar.display()
        );
        Ok(spec.architecture.clone())
    }
}

/// Load a single crop's classifier
pub fn load_crop<B: Backend>(models_dir: &Path, spec: &CropSpec, device: &B::Device) -> LoadOutcome {
    let attempt = || -> Result<CropModelEntry> {
        let descriptor = resolve_descriptor(models_dir, spec)?;
        let stem = models_dir.join(&spec.weights);
        let model = load_crop_net::<B>(&descriptor, &stem, device)?;

        let classifier: Arc<dyn CropClassifier> =
            Arc::new(BurnClassifier::new(model, device.clone()));
        let entry = CropModelEntry::new(classifier, spec.labels.clone());

        if !entry.labels_match_output() {
            warn!(
                "{}: {} labels but the classifier outputs {} classes",
                spec.crop,
                entry.labels.len(),
                entry.classifier.output_width()
            );
        }
        Ok(entry)
    };

    match attempt() {
        Ok(entry) => LoadOutcome::Loaded(entry),
        Err(e) => LoadOutcome::Failed(e),
    }
}

/// Load every crop in `catalog` from `models_dir`
///
/// Returns [`CropScanError::NoModelsLoaded`] when no crop loads.
pub fn load_all_models<B: Backend>(
    models_dir: &Path,
    catalog: &CropCatalog,
    device: &B::Device,
) -> Result<(ModelRegistry, LoadReport)> {
    info!(
        "Loading {} crop models from {}",
        catalog.crops.len(),
        models_dir.display()
    );

    let mut registry = ModelRegistry::new();
    let mut report = LoadReport::default();

    for spec in &catalog.crops {
        let weights = weights_file(&models_dir.join(&spec.weights));
        let mut status = CropLoadStatus {
            crop: spec.crop.clone(),
            loaded: false,
            weights: weights.clone(),
            labels: spec.labels.clone(),
            input_height: None,
            input_width: None,
            error: None,
        };

        match load_crop::<B>(models_dir, spec, device) {
            LoadOutcome::Loaded(entry) => {
                let input = entry.classifier.input_shape();
                info!(
                    "{} model loaded from {} (input {:?}x{:?}, {} classes)",
                    spec.crop,
                    weights.display(),
                    input.height,
                    input.width,
                    entry.classifier.output_width()
                );
                status.loaded = true;
                status.input_height = input.height;
                status.input_width = input.width;
                registry.insert(spec.crop.clone(), entry);
            }
            LoadOutcome::Failed(e) => {
                if spec.is_critical() {
                    error!("Failed to load {} model from {}: {}", spec.crop, weights.display(), e);
                } else {
                    warn!(
                        "{} model not loaded from {}: {} (placeholder crop)",
                        spec.crop,
                        weights.display(),
                        e
                    );
                }
                status.input_height = spec.architecture.input.height;
                status.input_width = spec.architecture.input.width;
                status.error = Some(e.to_string());
            }
        }
        report.crops.push(status);
    }

    if registry.is_empty() {
        error!("No models loaded from {}", models_dir.display());
        return Err(CropScanError::NoModelsLoaded(models_dir.to_path_buf()));
    }

    info!("Models loaded: {:?}", registry.available_models());
    let missing_critical: Vec<_> = catalog
        .crops
        .iter()
        .filter(|spec| spec.is_critical() && !registry.contains(&spec.crop))
        .map(|spec| spec.crop.as_str())
        .collect();
    if !missing_critical.is_empty() {
        warn!("Critical models failed to load: {:?}", missing_critical);
    }

    Ok((registry, report))
}

/// Load with the compile-time backend on its default device
pub fn load_builtin_models(
    models_dir: &Path,
    catalog: &CropCatalog,
) -> Result<(ModelRegistry, LoadReport)> {
    let device = default_device();
    load_all_models::<InferenceBackend>(models_dir, catalog, &device)
}
