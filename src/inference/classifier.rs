//! Classifier abstraction used by the registry and the prediction path
//!
//! The registry stores trait objects so the request path does not depend on
//! the backend, and tests can substitute fixed-output classifiers.

use std::sync::{Mutex, PoisonError};

use burn::tensor::{backend::Backend, Tensor, TensorData};

use super::preprocess::ImageTensor;
use crate::model::{CropNet, InputShape};
use crate::utils::error::{CropScanError, Result};

/// A loaded classifier: declared input shape, output width and a forward pass
pub trait CropClassifier: Send + Sync {
    /// Input resolution the classifier was built for
    fn input_shape(&self) -> InputShape;

    /// Number of classes in the probability vector
    fn output_width(&self) -> usize;

    /// Probability vector for one preprocessed image
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Burn network behind a mutex; requests to the same classifier are serialized
pub struct BurnClassifier<B: Backend> {
    model: Mutex<CropNet<B>>,
    device: B::Device,
    input: InputShape,
    classes: usize,
}

impl<B: Backend> BurnClassifier<B> {
    pub fn new(model: CropNet<B>, device: B::Device) -> Self {
        let input = model.input_shape();
        let classes = model.num_classes();
        Self {
            model: Mutex::new(model),
            device,
            input,
            classes,
        }
    }
}

impl<B: Backend> CropClassifier for BurnClassifier<B> {
    fn input_shape(&self) -> InputShape {
        self.input
    }

    fn output_width(&self) -> usize {
        self.classes
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let data = TensorData::new(input.data().to_vec(), input.shape());
        // NHWC -> NCHW
        let images = Tensor::<B, 4>::from_floats(data, &self.device).permute([0, 3, 1, 2]);

        // Forward passes never mutate the network, so a poisoned lock is still usable
        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let probabilities = model.forward(images);
        drop(model);

        probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CropScanError::Inference(format!("failed to read output: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::preprocess;
    use crate::model::{Activation, ArchitectureDescriptor, BackboneKind, HeadLayer, OutputLayer};
    use burn_ndarray::NdArray;
    use image::{DynamicImage, Rgb, RgbImage};

    type TestBackend = NdArray;

    fn classifier() -> BurnClassifier<TestBackend> {
        let descriptor = ArchitectureDescriptor {
            input: InputShape::new(32, 48),
            backbone: BackboneKind::PlainCnn { base_filters: 4 },
            head: vec![HeadLayer::Dense {
                name: "hidden".to_string(),
                units: 8,
                activation: Activation::Relu,
            }],
            output: OutputLayer {
                name: "out".to_string(),
                classes: 5,
            },
        };
        let device = Default::default();
        let model = CropNet::<TestBackend>::new(&descriptor, &device).unwrap();
        BurnClassifier::new(model, device)
    }

    #[test]
    fn test_reports_descriptor_metadata() {
        let classifier = classifier();
        assert_eq!(classifier.input_shape(), InputShape::new(32, 48));
        assert_eq!(classifier.output_width(), 5);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let classifier = classifier();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 40, |x, y| {
            Rgb([(x * 3) as u8, (y * 5) as u8, 128])
        }));
        let tensor = preprocess(&img, 32, 48);

        let first = classifier.predict(&tensor).unwrap();
        let second = classifier.predict(&tensor).unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        assert!(first.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_predict_after_panicked_holder() {
        let classifier = std::sync::Arc::new(classifier());
        let holder = std::sync::Arc::clone(&classifier);
        let joined = std::thread::spawn(move || {
            let _guard = holder.model.lock().unwrap();
            panic!("request thread died while holding the model");
        })
        .join();
        assert!(joined.is_err());
        assert!(classifier.model.is_poisoned());

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 32, Rgb([20, 160, 40])));
        let probs = classifier.predict(&preprocess(&img, 32, 48)).unwrap();
        assert_eq!(probs.len(), 5);
    }
}
