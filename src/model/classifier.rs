//! Crop disease classifier: backbone + head + softmax output
//!
//! The network is always built from an [`ArchitectureDescriptor`]; weights are
//! loaded into that freshly built topology and then checked layer by layer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::{
    module::{Ignored, Module},
    record::CompactRecorder,
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use tracing::debug;

use super::backbone::Backbone;
use super::descriptor::{Activation, ArchitectureDescriptor, InputShape};
use super::head::{DenseLayer, HeadBlock};
use super::shapes::{verify_shapes, CollectShapes, LayerShape};
use crate::utils::error::{CropScanError, Result};

/// File extension written by `CompactRecorder`
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Backbone, head layers and softmax output layer
#[derive(Module, Debug)]
pub struct CropNet<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: Vec<HeadBlock<B>>,
    pub output: DenseLayer<B>,
    input: Ignored<InputShape>,
    num_classes: usize,
}

impl<B: Backend> CropNet<B> {
    /// Build a randomly initialised network for `descriptor`
    pub fn new(descriptor: &ArchitectureDescriptor, device: &B::Device) -> Result<Self> {
        descriptor.validate()?;

        let backbone = Backbone::new(&descriptor.backbone, device);
        let mut features = backbone.feature_dim();

        let mut head = Vec::with_capacity(descriptor.head.len());
        for layer in &descriptor.head {
            let block = HeadBlock::new(layer, features, device);
            features = block.output_features(features);
            head.push(block);
        }

        let output = DenseLayer::new(
            &descriptor.output.name,
            features,
            descriptor.output.classes,
            Activation::Linear,
            device,
        );

        Ok(Self {
            backbone,
            head,
            output,
            input: Ignored(descriptor.input),
            num_classes: descriptor.output.classes,
        })
    }

    /// Declared input resolution
    pub fn input_shape(&self) -> InputShape {
        *self.input
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `[batch, 3, H, W]` -> class probabilities `[batch, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.backbone.forward(images);
        for block in &self.head {
            x = block.forward(x);
        }
        softmax(self.output.forward(x), 1)
    }

    /// Every parameter tensor shape, in construction order
    pub fn layer_shapes(&self) -> Vec<LayerShape> {
        let mut shapes = Vec::new();
        self.collect_shapes("", &mut shapes);
        shapes
    }
}

impl<B: Backend> CollectShapes for CropNet<B> {
    fn collect_shapes(&self, _prefix: &str, out: &mut Vec<LayerShape>) {
        self.backbone.collect_shapes("backbone", out);
        for (i, block) in self.head.iter().enumerate() {
            block.collect_shapes(&format!("head.{}", i), out);
        }
        self.output.collect_shapes("output", out);
    }
}

/// Path of the weight file for a stem (`<stem>.mpk`)
///
/// The recorder replaces whatever extension it is given, so it must always
/// receive this full path; a dotted stem would otherwise lose its suffix.
pub fn weights_file(stem: &Path) -> PathBuf {
    let mut file = stem.as_os_str().to_owned();
    file.push(".");
    file.push(WEIGHTS_EXTENSION);
    PathBuf::from(file)
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "weight deserialization panicked".to_string()
    }
}

/// Build the network for `descriptor` and load `<stem>.mpk` into it
///
/// Fails if the file is missing, cannot be decoded, or any parameter shape
/// differs from the freshly built topology.
pub fn load_crop_net<B: Backend>(
    descriptor: &ArchitectureDescriptor,
    stem: &Path,
    device: &B::Device,
) -> Result<CropNet<B>> {
    let file = weights_file(stem);
    if !file.exists() {
        return Err(CropScanError::WeightsNotFound(file));
    }

    let template = CropNet::<B>::new(descriptor, device)?;
    let expected = template.layer_shapes();
    debug!(
        "Built topology with {} parameter tensors ({} parameters)",
        expected.len(),
        template.num_params()
    );

    let recorder = CompactRecorder::new();
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
        template.load_file(file.clone(), &recorder, device)
    }))
    .map_err(|payload| CropScanError::WeightsLoad {
        path: file.clone(),
        reason: panic_reason(payload),
    })?
    .map_err(|e| CropScanError::WeightsLoad {
        path: file.clone(),
        reason: format!("{:?}", e),
    })?;

    verify_shapes(&expected, &loaded.layer_shapes())?;
    Ok(loaded)
}

/// Save a network's weights to `<stem>.mpk`
pub fn save_crop_net<B: Backend>(model: CropNet<B>, stem: &Path) -> Result<()> {
    if let Some(parent) = stem.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = weights_file(stem);
    let recorder = CompactRecorder::new();
    model
        .save_file(file.clone(), &recorder)
        .map_err(|e| CropScanError::WeightsLoad {
            path: file,
            reason: format!("failed to save: {:?}", e),
        })
}
