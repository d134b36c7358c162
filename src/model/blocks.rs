//! Convolutional building blocks shared by the backbones
//!
//! - `ConvBnAct`: convolution, batch norm, activation
//! - `SqueezeExcite`: channel re-weighting from globally pooled features
//! - `MbConv`: inverted residual (MobileNetV2 / EfficientNet)
//! - `FusedMbConv`: EfficientNetV2 early-stage block
//! - `ConvBlock`: plain conv/batch-norm/ReLU/max-pool block

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use super::descriptor::Activation;
use super::shapes::{batch_norm_shapes, conv_shapes, CollectShapes, LayerShape};

/// Apply an activation to a tensor of any rank
pub fn activate<B: Backend, const D: usize>(x: Tensor<B, D>, act: Activation) -> Tensor<B, D> {
    match act {
        Activation::Linear => x,
        Activation::Relu => activation::relu(x),
        Activation::Relu6 => activation::relu(x).clamp_max(6.0),
        Activation::Swish => x.clone() * activation::sigmoid(x),
        Activation::Sigmoid => activation::sigmoid(x),
    }
}

/// Conv2d (no bias) + BatchNorm + activation
#[derive(Module, Debug)]
pub struct ConvBnAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    act: Ignored<Activation>,
}

impl<B: Backend> ConvBnAct<B> {
    /// `groups == in_channels` gives a depthwise convolution
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        act: Activation,
        device: &B::Device,
    ) -> Self {
        let pad = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            act: Ignored(act),
        }
    }

    /// Pointwise (1x1) projection
    pub fn pointwise(
        in_channels: usize,
        out_channels: usize,
        act: Activation,
        device: &B::Device,
    ) -> Self {
        Self::new(in_channels, out_channels, 1, 1, 1, act, device)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        activate(x, *self.act)
    }
}

impl<B: Backend> CollectShapes for ConvBnAct<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        conv_shapes(&self.conv, &format!("{}.conv", prefix), out);
        batch_norm_shapes(&self.bn, &format!("{}.bn", prefix), out);
    }
}

/// Squeeze-and-excitation: pool, reduce (swish), expand (sigmoid), rescale
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let s = self.pool.forward(x.clone());
        let s = activate(self.reduce.forward(s), Activation::Swish);
        let s = activation::sigmoid(self.expand.forward(s));
        x * s
    }
}

impl<B: Backend> CollectShapes for SqueezeExcite<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        conv_shapes(&self.reduce, &format!("{}.reduce", prefix), out);
        conv_shapes(&self.expand, &format!("{}.expand", prefix), out);
    }
}

/// Parameters of one inverted-residual block
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub expand_ratio: usize,
    /// Squeeze width as a fraction of `in_channels`; 0 disables SE
    pub se_ratio: f64,
    pub act: Activation,
}

impl BlockSpec {
    fn expanded(&self) -> usize {
        self.in_channels * self.expand_ratio
    }

    fn squeezed(&self) -> Option<usize> {
        if self.se_ratio > 0.0 {
            Some(((self.in_channels as f64 * self.se_ratio) as usize).max(1))
        } else {
            None
        }
    }
}

/// Inverted residual block: expand (1x1), depthwise (kxk), optional SE, project (1x1)
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand: Option<ConvBnAct<B>>,
    pub depthwise: ConvBnAct<B>,
    pub se: Option<SqueezeExcite<B>>,
    pub project: ConvBnAct<B>,
}

impl<B: Backend> MbConv<B> {
    pub fn new(spec: BlockSpec, device: &B::Device) -> Self {
        let hidden = spec.expanded();

        let expand = if spec.expand_ratio != 1 {
            Some(ConvBnAct::pointwise(spec.in_channels, hidden, spec.act, device))
        } else {
            None
        };
        let depthwise = ConvBnAct::new(
            hidden,
            hidden,
            spec.kernel_size,
            spec.stride,
            hidden,
            spec.act,
            device,
        );
        let se = spec
            .squeezed()
            .map(|squeezed| SqueezeExcite::new(hidden, squeezed, device));
        let project = ConvBnAct::pointwise(hidden, spec.out_channels, Activation::Linear, device);

        Self {
            expand,
            depthwise,
            se,
            project,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = expand.forward(x);
        }
        x = self.depthwise.forward(x);
        if let Some(se) = &self.se {
            x = se.forward(x);
        }
        x = self.project.forward(x);

        // Identity shortcut exactly when stride is 1 and channels are preserved
        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

impl<B: Backend> CollectShapes for MbConv<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        if let Some(expand) = &self.expand {
            expand.collect_shapes(&format!("{}.expand", prefix), out);
        }
        self.depthwise
            .collect_shapes(&format!("{}.depthwise", prefix), out);
        if let Some(se) = &self.se {
            se.collect_shapes(&format!("{}.se", prefix), out);
        }
        self.project.collect_shapes(&format!("{}.project", prefix), out);
    }
}

/// Fused inverted residual: a single kxk expansion replaces expand + depthwise
#[derive(Module, Debug)]
pub struct FusedMbConv<B: Backend> {
    pub expand: ConvBnAct<B>,
    pub se: Option<SqueezeExcite<B>>,
    pub project: Option<ConvBnAct<B>>,
}

impl<B: Backend> FusedMbConv<B> {
    pub fn new(spec: BlockSpec, device: &B::Device) -> Self {
        if spec.expand_ratio == 1 {
            // No expansion: the kxk conv maps straight to the output width
            let expand = ConvBnAct::new(
                spec.in_channels,
                spec.out_channels,
                spec.kernel_size,
                spec.stride,
                1,
                spec.act,
                device,
            );
            let se = spec
                .squeezed()
                .map(|squeezed| SqueezeExcite::new(spec.out_channels, squeezed, device));
            return Self {
                expand,
                se,
                project: None,
            };
        }

        let hidden = spec.expanded();
        let expand = ConvBnAct::new(
            spec.in_channels,
            hidden,
            spec.kernel_size,
            spec.stride,
            1,
            spec.act,
            device,
        );
        let se = spec
            .squeezed()
            .map(|squeezed| SqueezeExcite::new(hidden, squeezed, device));
        let project = ConvBnAct::pointwise(hidden, spec.out_channels, Activation::Linear, device);

        Self {
            expand,
            se,
            project: Some(project),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.expand.forward(input.clone());
        if let Some(se) = &self.se {
            x = se.forward(x);
        }
        if let Some(project) = &self.project {
            x = project.forward(x);
        }

        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

impl<B: Backend> CollectShapes for FusedMbConv<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        self.expand.collect_shapes(&format!("{}.expand", prefix), out);
        if let Some(se) = &self.se {
            se.collect_shapes(&format!("{}.se", prefix), out);
        }
        if let Some(project) = &self.project {
            project.collect_shapes(&format!("{}.project", prefix), out);
        }
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

impl<B: Backend> CollectShapes for ConvBlock<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        conv_shapes(&self.conv, &format!("{}.conv", prefix), out);
        batch_norm_shapes(&self.bn, &format!("{}.bn", prefix), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn spec(in_channels: usize, out_channels: usize, stride: usize, expand_ratio: usize) -> BlockSpec {
        BlockSpec {
            in_channels,
            out_channels,
            kernel_size: 3,
            stride,
            expand_ratio,
            se_ratio: 0.25,
            act: Activation::Swish,
        }
    }

    #[test]
    fn test_activation_ranges() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-3.0, 0.5, 9.0], &device);

        let relu6: Vec<f32> = activate(x.clone(), Activation::Relu6)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(relu6, vec![0.0, 0.5, 6.0]);

        let sigmoid: Vec<f32> = activate(x, Activation::Sigmoid).into_data().to_vec().unwrap();
        assert!(sigmoid.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_mbconv_downsamples() {
        let device = Default::default();
        let block = MbConv::<TestBackend>::new(spec(8, 16, 2, 6), &device);
        let x = Tensor::<TestBackend, 4>::random([1, 8, 16, 16], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn test_mbconv_residual_keeps_shape() {
        let device = Default::default();
        let block = MbConv::<TestBackend>::new(spec(8, 8, 1, 1), &device);
        assert!(block.expand.is_none());
        let x = Tensor::<TestBackend, 4>::random([1, 8, 8, 8], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 8, 8]);
    }

    #[test]
    fn test_fused_mbconv_shapes() {
        let device = Default::default();
        let plain = FusedMbConv::<TestBackend>::new(spec(8, 8, 1, 1), &device);
        assert!(plain.project.is_none());

        let expanded = FusedMbConv::<TestBackend>::new(spec(8, 12, 2, 4), &device);
        let x = Tensor::<TestBackend, 4>::random([1, 8, 16, 16], Distribution::Default, &device);
        assert_eq!(expanded.forward(x).dims(), [1, 12, 8, 8]);

        let mut shapes = Vec::new();
        expanded.collect_shapes("block", &mut shapes);
        assert_eq!(shapes[0].name, "block.expand.conv.weight");
        assert_eq!(shapes[0].dims, vec![32, 8, 3, 3]);
    }

    #[test]
    fn test_conv_block_halves_resolution() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(3, 4, 3, true, &device);
        let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [1, 4, 16, 16]);
    }
}
