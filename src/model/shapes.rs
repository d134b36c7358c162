//! Per-layer parameter shapes
//!
//! Burn records are matched structurally, so a weight file written by a
//! different topology can still deserialize. Listing every parameter shape of
//! the freshly built network and of the loaded one, then comparing the two,
//! turns such a mismatch into an error that names the offending layer.

use burn::{
    nn::{conv::Conv2d, BatchNorm, Linear},
    tensor::backend::Backend,
};

use crate::utils::error::{CropScanError, Result};

/// Shape of one named parameter tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShape {
    pub name: String,
    pub dims: Vec<usize>,
}

impl LayerShape {
    pub fn new(name: impl Into<String>, dims: &[usize]) -> Self {
        Self {
            name: name.into(),
            dims: dims.to_vec(),
        }
    }
}

/// Modules that can list their parameter shapes under a name prefix
pub trait CollectShapes {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>);
}

pub(crate) fn conv_shapes<B: Backend>(conv: &Conv2d<B>, prefix: &str, out: &mut Vec<LayerShape>) {
    out.push(LayerShape::new(
        format!("{}.weight", prefix),
        &conv.weight.val().dims(),
    ));
    if let Some(bias) = &conv.bias {
        out.push(LayerShape::new(format!("{}.bias", prefix), &bias.val().dims()));
    }
}

pub(crate) fn batch_norm_shapes<B: Backend>(
    bn: &BatchNorm<B>,
    prefix: &str,
    out: &mut Vec<LayerShape>,
) {
    out.push(LayerShape::new(format!("{}.gamma", prefix), &bn.gamma.val().dims()));
    out.push(LayerShape::new(format!("{}.beta", prefix), &bn.beta.val().dims()));
}

pub(crate) fn linear_shapes<B: Backend>(linear: &Linear<B>, prefix: &str, out: &mut Vec<LayerShape>) {
    out.push(LayerShape::new(
        format!("{}.weight", prefix),
        &linear.weight.val().dims(),
    ));
    if let Some(bias) = &linear.bias {
        out.push(LayerShape::new(format!("{}.bias", prefix), &bias.val().dims()));
    }
}

/// Compare the shapes of a loaded network against the ones it was built with
pub fn verify_shapes(expected: &[LayerShape], received: &[LayerShape]) -> Result<()> {
    for (want, got) in expected.iter().zip(received) {
        if want.name != got.name || want.dims != got.dims {
            return Err(CropScanError::ShapeMismatch {
                layer: want.name.clone(),
                expected: want.dims.clone(),
                received: got.dims.clone(),
            });
        }
    }

    if expected.len() != received.len() {
        return Err(CropScanError::LayerCount {
            expected: expected.len(),
            received: received.len(),
        });
    }

    Ok(())
}
