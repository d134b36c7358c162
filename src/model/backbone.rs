//! Feature-extraction backbones
//!
//! Each backbone maps `[batch, 3, H, W]` to a pooled feature vector
//! `[batch, feature_dim]`. Stage tables follow the published MobileNetV2,
//! EfficientNet and EfficientNetV2 configurations, scaled by the variant's
//! width/depth coefficients.

use burn::{
    module::Module,
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    tensor::{backend::Backend, Tensor},
};

use super::blocks::{BlockSpec, ConvBlock, ConvBnAct, FusedMbConv, MbConv};
use super::descriptor::{Activation, BackboneKind};
use super::shapes::{CollectShapes, LayerShape};

/// Channel counts are kept multiples of this
const CHANNEL_DIVISOR: usize = 8;

/// Round `value` to the nearest multiple of `divisor`, never dropping more than 10%
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let mut rounded = (((value + d / 2.0) / d).floor() * d).max(d);
    if rounded < 0.9 * value {
        rounded += d;
    }
    rounded as usize
}

fn round_repeats(repeats: usize, depth: f64) -> usize {
    (depth * repeats as f64).ceil() as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    MbConv,
    Fused,
}

/// One stage of identical blocks; the first block carries the stride
#[derive(Debug, Clone, Copy)]
struct StageSpec {
    kind: BlockKind,
    kernel_size: usize,
    stride: usize,
    expand_ratio: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
    se_ratio: f64,
}

#[allow(clippy::too_many_arguments)]
const fn stage(
    kind: BlockKind,
    kernel_size: usize,
    stride: usize,
    expand_ratio: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
    se_ratio: f64,
) -> StageSpec {
    StageSpec {
        kind,
        kernel_size,
        stride,
        expand_ratio,
        in_channels,
        out_channels,
        repeats,
        se_ratio,
    }
}

/// (expansion, output channels, repeats, stride)
const MOBILENET_V2_STAGES: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

const EFFICIENTNET_STAGES: [StageSpec; 7] = [
    stage(BlockKind::MbConv, 3, 1, 1, 32, 16, 1, 0.25),
    stage(BlockKind::MbConv, 3, 2, 6, 16, 24, 2, 0.25),
    stage(BlockKind::MbConv, 5, 2, 6, 24, 40, 2, 0.25),
    stage(BlockKind::MbConv, 3, 2, 6, 40, 80, 3, 0.25),
    stage(BlockKind::MbConv, 5, 1, 6, 80, 112, 3, 0.25),
    stage(BlockKind::MbConv, 5, 2, 6, 112, 192, 4, 0.25),
    stage(BlockKind::MbConv, 3, 1, 6, 192, 320, 1, 0.25),
];

const EFFICIENTNET_V2_STAGES: [StageSpec; 6] = [
    stage(BlockKind::Fused, 3, 1, 1, 32, 16, 1, 0.0),
    stage(BlockKind::Fused, 3, 2, 4, 16, 32, 2, 0.0),
    stage(BlockKind::Fused, 3, 2, 4, 32, 48, 2, 0.0),
    stage(BlockKind::MbConv, 3, 2, 4, 48, 96, 3, 0.25),
    stage(BlockKind::MbConv, 3, 1, 6, 96, 112, 5, 0.25),
    stage(BlockKind::MbConv, 3, 2, 6, 112, 192, 8, 0.25),
];

/// One block of a backbone body
#[derive(Module, Debug)]
pub enum BackboneBlock<B: Backend> {
    MbConv(MbConv<B>),
    Fused(FusedMbConv<B>),
    Plain(ConvBlock<B>),
}

impl<B: Backend> BackboneBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::MbConv(block) => block.forward(x),
            Self::Fused(block) => block.forward(x),
            Self::Plain(block) => block.forward(x),
        }
    }
}

impl<B: Backend> CollectShapes for BackboneBlock<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        match self {
            Self::MbConv(block) => block.collect_shapes(prefix, out),
            Self::Fused(block) => block.collect_shapes(prefix, out),
            Self::Plain(block) => block.collect_shapes(prefix, out),
        }
    }
}

/// Stem, body blocks, optional 1x1 top convolution, global average pooling
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub stem: Option<ConvBnAct<B>>,
    pub blocks: Vec<BackboneBlock<B>>,
    pub top: Option<ConvBnAct<B>>,
    pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    /// Build the backbone described by `kind`
    pub fn new(kind: &BackboneKind, device: &B::Device) -> Self {
        match kind {
            BackboneKind::MobileNetV2 { alpha } => Self::mobilenet_v2(*alpha, device),
            BackboneKind::EfficientNet { variant } => {
                let (width, depth) = variant.coefficients();
                Self::efficientnet(&EFFICIENTNET_STAGES, width, depth, device)
            }
            BackboneKind::EfficientNetV2 { variant } => {
                let (width, depth) = variant.coefficients();
                Self::efficientnet(&EFFICIENTNET_V2_STAGES, width, depth, device)
            }
            BackboneKind::PlainCnn { base_filters } => Self::plain_cnn(*base_filters, device),
        }
    }

    fn mobilenet_v2(alpha: f64, device: &B::Device) -> Self {
        let act = Activation::Relu6;
        let stem_channels = make_divisible(32.0 * alpha, CHANNEL_DIVISOR);
        let stem = ConvBnAct::new(3, stem_channels, 3, 2, 1, act, device);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (expand_ratio, channels, repeats, stride) in MOBILENET_V2_STAGES {
            let out_channels = make_divisible((channels as f64 * alpha).floor(), CHANNEL_DIVISOR);
            for i in 0..repeats {
                let spec = BlockSpec {
                    in_channels,
                    out_channels,
                    kernel_size: 3,
                    stride: if i == 0 { stride } else { 1 },
                    expand_ratio,
                    se_ratio: 0.0,
                    act,
                };
                blocks.push(BackboneBlock::MbConv(MbConv::new(spec, device)));
                in_channels = out_channels;
            }
        }

        let top_channels = if alpha > 1.0 {
            make_divisible(1280.0 * alpha, CHANNEL_DIVISOR)
        } else {
            1280
        };
        let top = ConvBnAct::pointwise(in_channels, top_channels, act, device);

        Self {
            stem: Some(stem),
            blocks,
            top: Some(top),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim: top_channels,
        }
    }

    fn efficientnet(stages: &[StageSpec], width: f64, depth: f64, device: &B::Device) -> Self {
        let act = Activation::Swish;
        let round_filters = |filters: usize| make_divisible(filters as f64 * width, CHANNEL_DIVISOR);

        let stem_channels = round_filters(stages[0].in_channels);
        let stem = ConvBnAct::new(3, stem_channels, 3, 2, 1, act, device);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for stage in stages {
            let out_channels = round_filters(stage.out_channels);
            for i in 0..round_repeats(stage.repeats, depth) {
                let spec = BlockSpec {
                    in_channels,
                    out_channels,
                    kernel_size: stage.kernel_size,
                    stride: if i == 0 { stage.stride } else { 1 },
                    expand_ratio: stage.expand_ratio,
                    se_ratio: stage.se_ratio,
                    act,
                };
                let block = match stage.kind {
                    BlockKind::MbConv => BackboneBlock::MbConv(MbConv::new(spec, device)),
                    BlockKind::Fused => BackboneBlock::Fused(FusedMbConv::new(spec, device)),
                };
                blocks.push(block);
                in_channels = out_channels;
            }
        }

        let top_channels = round_filters(1280);
        let top = ConvBnAct::pointwise(in_channels, top_channels, act, device);

        Self {
            stem: Some(stem),
            blocks,
            top: Some(top),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim: top_channels,
        }
    }

    fn plain_cnn(base: usize, device: &B::Device) -> Self {
        // 3 -> base -> 2*base -> 4*base -> 8*base, halving resolution each block
        let widths = [3, base, base * 2, base * 4, base * 8];
        let blocks = widths
            .windows(2)
            .map(|pair| BackboneBlock::Plain(ConvBlock::new(pair[0], pair[1], 3, true, device)))
            .collect();

        Self {
            stem: None,
            blocks,
            top: None,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim: base * 8,
        }
    }

    /// Width of the pooled feature vector
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// `[batch, 3, H, W]` -> `[batch, feature_dim]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        if let Some(stem) = &self.stem {
            x = stem.forward(x);
        }
        for block in &self.blocks {
            x = block.forward(x);
        }
        if let Some(top) = &self.top {
            x = top.forward(x);
        }

        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }
}

impl<B: Backend> CollectShapes for Backbone<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        if let Some(stem) = &self.stem {
            stem.collect_shapes(&format!("{}.stem", prefix), out);
        }
        for (i, block) in self.blocks.iter().enumerate() {
            block.collect_shapes(&format!("{}.blocks.{}", prefix, i), out);
        }
        if let Some(top) = &self.top {
            top.collect_shapes(&format!("{}.top", prefix), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::{EfficientNetV2Variant, EfficientNetVariant};
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(32.0 * 1.4, 8), 48);
        assert_eq!(make_divisible(1280.0 * 1.4, 8), 1792);
        assert_eq!(make_divisible(1280.0 * 1.2, 8), 1536);
        assert_eq!(make_divisible(3.0, 8), 8);
    }

    #[test]
    fn test_mobilenet_v2_layout() {
        let device = Default::default();
        let backbone =
            Backbone::<TestBackend>::new(&BackboneKind::MobileNetV2 { alpha: 1.0 }, &device);
        assert_eq!(backbone.feature_dim(), 1280);
        assert_eq!(backbone.blocks.len(), 17);
    }

    #[test]
    fn test_efficientnet_b4_layout() {
        let device = Default::default();
        let backbone = Backbone::<TestBackend>::new(
            &BackboneKind::EfficientNet {
                variant: EfficientNetVariant::B4,
            },
            &device,
        );
        assert_eq!(backbone.feature_dim(), 1792);
        // ceil(1.8 * [1, 2, 2, 3, 3, 4, 1]) summed
        assert_eq!(backbone.blocks.len(), 32);
    }

    #[test]
    fn test_efficientnet_v2_b3_layout() {
        let device = Default::default();
        let backbone = Backbone::<TestBackend>::new(
            &BackboneKind::EfficientNetV2 {
                variant: EfficientNetV2Variant::B3,
            },
            &device,
        );
        assert_eq!(backbone.feature_dim(), 1536);
        assert!(matches!(backbone.blocks[0], BackboneBlock::Fused(_)));
        assert!(matches!(backbone.blocks.last(), Some(BackboneBlock::MbConv(_))));
    }

    #[test]
    fn test_plain_cnn_forward() {
        let device = Default::default();
        let backbone =
            Backbone::<TestBackend>::new(&BackboneKind::PlainCnn { base_filters: 4 }, &device);
        let x = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        assert_eq!(backbone.forward(x).dims(), [2, 32]);

        let mut shapes = Vec::new();
        backbone.collect_shapes("backbone", &mut shapes);
        assert_eq!(shapes[0].name, "backbone.blocks.0.conv.weight");
        assert_eq!(shapes[0].dims, vec![4, 3, 3, 3]);
    }
}
