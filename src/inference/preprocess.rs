//! Image preprocessing
//!
//! Mirrors training-time preprocessing: RGB, exact resize (no aspect
//! preservation) with Lanczos3, scale to [0, 1], leading batch dimension.

use image::{imageops::FilterType, DynamicImage};
use tracing::warn;

use crate::model::InputShape;
use crate::utils::error::{CropScanError, Result};

/// Side length used when a classifier does not declare its input size
pub const FALLBACK_INPUT_SIZE: u32 = 224;

/// A single image as an NHWC `[1, height, width, 3]` float tensor
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    /// Row-major NHWC values
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decode uploaded bytes, guessing the format from content
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| CropScanError::ImageDecode(e.to_string()))
}

/// `(height, width)` to resize to for a classifier's declared input
pub fn target_size(input: InputShape, crop: &str) -> (u32, u32) {
    match input.resolved() {
        Some((height, width)) => (height as u32, width as u32),
        None => {
            warn!(
                "Unexpected input shape for model {}: {:?}. Using default {}x{}.",
                crop, input, FALLBACK_INPUT_SIZE, FALLBACK_INPUT_SIZE
            );
            (FALLBACK_INPUT_SIZE, FALLBACK_INPUT_SIZE)
        }
    }
}

/// Convert an image into the `[1, target_height, target_width, 3]` tensor a classifier expects
pub fn preprocess(image: &DynamicImage, target_height: u32, target_width: u32) -> ImageTensor {
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, target_width, target_height, FilterType::Lanczos3);

    let data = resized
        .as_raw()
        .iter()
        .map(|&v| v as f32 / 255.0)
        .collect();

    ImageTensor {
        data,
        shape: [1, target_height as usize, target_width as usize, 3],
    }
}
