//! Inference Predictor Module
//!
//! Runs one uploaded image through a registered crop classifier and resolves
//! the most probable label.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::preprocess::{decode_image, preprocess, target_size};
use crate::registry::CropModelEntry;
use crate::utils::error::{CropScanError, Result};

/// Label returned when the arg-max index has no matching label
pub const UNKNOWN_CLASS_LABEL: &str = "Unknown Class (Index out of bounds for labels list)";

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index
    pub class_index: usize,

    /// Predicted label, or [`UNKNOWN_CLASS_LABEL`]
    pub label: String,

    /// Probability of the predicted class; 0.0 for an unknown class
    pub confidence: f32,

    /// Decode + preprocess + forward time in milliseconds
    pub inference_time_ms: f64,
}

/// Index and value of the largest probability; first one wins on ties
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, top)) if top.total_cmp(&p).is_ge() => best,
            _ => Some((i, p)),
        })
}

/// Pick the most probable class and map it to a label
///
/// An index outside `labels` means the registry entry is inconsistent (label
/// count differs from classifier width); that degrades to
/// [`UNKNOWN_CLASS_LABEL`] with zero confidence instead of failing.
pub fn resolve_prediction(
    crop: &str,
    probabilities: &[f32],
    labels: &[String],
    elapsed: Duration,
) -> Result<Prediction> {
    let (class_index, probability) = argmax(probabilities).ok_or_else(|| {
        CropScanError::Inference("classifier returned an empty probability vector".to_string())
    })?;

    let (label, confidence) = match labels.get(class_index) {
        Some(label) => (label.clone(), probability),
        None => {
            error!(
                "Prediction index {} out of bounds for labels {:?} in model {}.",
                class_index, labels, crop
            );
            (UNKNOWN_CLASS_LABEL.to_string(), 0.0)
        }
    };

    Ok(Prediction {
        class_index,
        label,
        confidence,
        inference_time_ms: elapsed.as_secs_f64() * 1000.0,
    })
}

/// Decode `bytes`, preprocess for the entry's classifier and predict
pub fn predict_bytes(crop: &str, entry: &CropModelEntry, bytes: &[u8]) -> Result<Prediction> {
    let start = Instant::now();

    let image = decode_image(bytes)?;
    let (height, width) = target_size(entry.classifier.input_shape(), crop);
    let tensor = preprocess(&image, height, width);

    let probabilities = entry.classifier.predict(&tensor)?;
    let prediction = resolve_prediction(crop, &probabilities, &entry.labels, start.elapsed())?;

    debug!(
        "{}: {} ({:.2}%) in {:.1} ms",
        crop,
        prediction.label,
        prediction.confidence * 100.0,
        prediction.inference_time_ms
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use image::{DynamicImage, ImageFormat};

    use crate::inference::{CropClassifier, ImageTensor};
    use crate::model::InputShape;

    struct FixedClassifier {
        input: InputShape,
        output: Vec<f32>,
    }

    impl CropClassifier for FixedClassifier {
        fn input_shape(&self) -> InputShape {
            self.input
        }

        fn output_width(&self) -> usize {
            self.output.len()
        }

        fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
            assert_eq!(input.height(), self.input.height.unwrap_or(224));
            Ok(self.output.clone())
        }
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{}", i)).collect()
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(20, 30)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_fixed_distribution_selects_index_three() {
        let probs = [0.05, 0.05, 0.05, 0.80, 0.05];
        let prediction =
            resolve_prediction("tomato", &probs, &labels(5), Duration::from_millis(3)).unwrap();

        assert_eq!(prediction.class_index, 3);
        assert_eq!(prediction.label, "class_3");
        assert_eq!(prediction.confidence, 0.80);
    }

    #[test]
    fn test_out_of_bounds_index_degrades() {
        let probs = [0.1, 0.1, 0.1, 0.7];
        let prediction =
            resolve_prediction("maize", &probs, &labels(3), Duration::ZERO).unwrap();

        assert_eq!(prediction.label, UNKNOWN_CLASS_LABEL);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.class_index, 3);
    }

    #[test]
    fn test_empty_output_is_an_error() {
        assert!(resolve_prediction("maize", &[], &labels(3), Duration::ZERO).is_err());
    }

    #[test]
    fn test_predict_bytes_end_to_end() {
        let entry = CropModelEntry::new(
            Arc::new(FixedClassifier {
                input: InputShape::square(64),
                output: vec![0.05, 0.05, 0.05, 0.80, 0.05],
            }),
            labels(5),
        );

        let first = predict_bytes("tomato", &entry, &png_bytes()).unwrap();
        let second = predict_bytes("tomato", &entry, &png_bytes()).unwrap();
        assert_eq!(first.label, "class_3");
        assert_eq!(first.label, second.label);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_predict_bytes_falls_back_to_224() {
        let entry = CropModelEntry::new(
            Arc::new(FixedClassifier {
                input: InputShape::unspecified(),
                output: vec![1.0],
            }),
            labels(1),
        );
        let prediction = predict_bytes("cassava", &entry, &png_bytes()).unwrap();
        assert_eq!(prediction.label, "class_0");
    }

    #[test]
    fn test_predict_bytes_bad_image() {
        let entry = CropModelEntry::new(
            Arc::new(FixedClassifier {
                input: InputShape::square(8),
                output: vec![1.0],
            }),
            labels(1),
        );
        assert!(matches!(
            predict_bytes("cashew", &entry, b"not a png"),
            Err(CropScanError::ImageDecode(_))
        ));
    }
}
