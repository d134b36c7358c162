//! Classifier head layers
//!
//! Layers operate on the pooled `[batch, features]` vector produced by the
//! backbone. Each parameterised layer keeps the name it was given in the
//! descriptor so load errors point at the right layer.

use burn::{
    module::{Ignored, Module},
    nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

use super::blocks::activate;
use super::descriptor::{Activation, HeadLayer};
use super::shapes::{batch_norm_shapes, linear_shapes, CollectShapes, LayerShape};

/// Fully connected layer with activation
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    pub linear: Linear<B>,
    act: Ignored<Activation>,
    name: Ignored<String>,
}

impl<B: Backend> DenseLayer<B> {
    pub fn new(
        name: &str,
        d_input: usize,
        d_output: usize,
        act: Activation,
        device: &B::Device,
    ) -> Self {
        Self {
            linear: LinearConfig::new(d_input, d_output).init(device),
            act: Ignored(act),
            name: Ignored(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> usize {
        self.linear.weight.val().dims()[1]
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        activate(self.linear.forward(x), *self.act)
    }
}

impl<B: Backend> CollectShapes for DenseLayer<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        linear_shapes(&self.linear, &format!("{}.{}", prefix, self.name()), out);
    }
}

/// Batch norm over a feature vector
#[derive(Module, Debug)]
pub struct FeatureBatchNorm<B: Backend> {
    pub bn: BatchNorm<B>,
    name: Ignored<String>,
}

impl<B: Backend> FeatureBatchNorm<B> {
    pub fn new(name: &str, features: usize, device: &B::Device) -> Self {
        Self {
            bn: BatchNormConfig::new(features).init(device),
            name: Ignored(name.to_string()),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        // Batch norm expects a trailing spatial dimension
        let [batch, features] = x.dims();
        let x: Tensor<B, 3> = x.reshape([batch, features, 1]);
        self.bn.forward(x).reshape([batch, features])
    }
}

impl<B: Backend> CollectShapes for FeatureBatchNorm<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        batch_norm_shapes(&self.bn, &format!("{}.{}", prefix, self.name.as_str()), out);
    }
}

/// Channel attention gate: `x * sigmoid(excite(dropout(relu(squeeze(x)))))`
#[derive(Module, Debug)]
pub struct ChannelAttention<B: Backend> {
    pub squeeze: DenseLayer<B>,
    dropout: Dropout,
    pub excite: DenseLayer<B>,
}

impl<B: Backend> ChannelAttention<B> {
    pub fn new(
        name: &str,
        features: usize,
        hidden_units: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            squeeze: DenseLayer::new(
                &format!("{}_dense_1", name),
                features,
                hidden_units,
                Activation::Relu,
                device,
            ),
            dropout: DropoutConfig::new(dropout).init(),
            excite: DenseLayer::new(
                &format!("{}_dense_2", name),
                hidden_units,
                features,
                Activation::Sigmoid,
                device,
            ),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let gate = self.squeeze.forward(x.clone());
        let gate = self.dropout.forward(gate);
        let gate = self.excite.forward(gate);
        x * gate
    }
}

impl<B: Backend> CollectShapes for ChannelAttention<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        self.squeeze.collect_shapes(prefix, out);
        self.excite.collect_shapes(prefix, out);
    }
}

/// One head layer
#[derive(Module, Debug)]
pub enum HeadBlock<B: Backend> {
    Dense(DenseLayer<B>),
    Dropout(Dropout),
    BatchNorm(FeatureBatchNorm<B>),
    Attention(ChannelAttention<B>),
}

impl<B: Backend> HeadBlock<B> {
    /// Build a head layer that consumes `features` inputs
    pub fn new(layer: &HeadLayer, features: usize, device: &B::Device) -> Self {
        match layer {
            HeadLayer::Dense {
                name,
                units,
                activation,
            } => Self::Dense(DenseLayer::new(name, features, *units, *activation, device)),
            HeadLayer::Dropout { rate } => Self::Dropout(DropoutConfig::new(*rate).init()),
            HeadLayer::BatchNorm { name } => {
                Self::BatchNorm(FeatureBatchNorm::new(name, features, device))
            }
            HeadLayer::ChannelAttention {
                name,
                hidden_units,
                dropout,
            } => Self::Attention(ChannelAttention::new(
                name,
                features,
                *hidden_units,
                *dropout,
                device,
            )),
        }
    }

    /// Width of this layer's output given its input width
    pub fn output_features(&self, features: usize) -> usize {
        match self {
            Self::Dense(dense) => dense.units(),
            _ => features,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Dense(layer) => layer.forward(x),
            Self::Dropout(layer) => layer.forward(x),
            Self::BatchNorm(layer) => layer.forward(x),
            Self::Attention(layer) => layer.forward(x),
        }
    }
}

impl<B: Backend> CollectShapes for HeadBlock<B> {
    fn collect_shapes(&self, prefix: &str, out: &mut Vec<LayerShape>) {
        match self {
            Self::Dense(layer) => layer.collect_shapes(prefix, out),
            Self::Dropout(_) => {}
            Self::BatchNorm(layer) => layer.collect_shapes(prefix, out),
            Self::Attention(layer) => layer.collect_shapes(prefix, out),
        }
    }
}
