// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! In-memory feed-forward image classifier.
//!
//! A `Sequential` is an ordered list of layers with owned `f32` weights, laid
//! out the way ONNX expects them (`Conv` weights as `[out, in, k, k]`, `Gemm`
//! weights as `[out, in]`). It is always in inference mode, so exporting it
//! never has to touch the caller's value. Forward passes run through tract on
//! the exported graph.

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_stride() -> usize {
    1
}

fn default_padding() -> usize {
    0
}

/// 2D convolution with square kernels, dilation 1 and a single group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default = "default_padding")]
    pub padding: usize,
    /// Row-major `[out_channels, in_channels, kernel_size, kernel_size]`.
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Max pooling over square windows. `stride` defaults to the window size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub kernel_size: usize,
    #[serde(default)]
    pub stride: Option<usize>,
    #[serde(default = "default_padding")]
    pub padding: usize,
}

/// Fully connected layer, `y = x W^T + b`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    /// Row-major `[out_features, in_features]`.
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    Relu,
    MaxPool2d(MaxPool2d),
    Flatten,
    Linear(Linear),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequential {
    pub layers: Vec<Layer>,
}

fn uniform(rng: &mut impl Rng, len: usize, fan_in: usize) -> Vec<f32> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    (0..len).map(|_| rng.gen_range(-bound..=bound)).collect()
}

fn pooled_len(len: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = len + 2 * padding;
    if kernel == 0 || stride == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

fn window_dims(
    op: &str,
    (h, w): (usize, usize),
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<(usize, usize)> {
    match (
        pooled_len(h, kernel, stride, padding),
        pooled_len(w, kernel, stride, padding),
    ) {
        (Some(oh), Some(ow)) => Ok((oh, ow)),
        _ => Err(Error::InvalidModel(format!(
            "{} window {} does not fit {}x{} input",
            op, kernel, h, w
        ))),
    }
}

impl Conv2d {
    /// Fresh layer with PyTorch's default `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` init.
    pub fn init(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weight: uniform(rng, out_channels * fan_in, fan_in),
            bias: uniform(rng, out_channels, fan_in),
        }
    }

    pub fn weight_shape(&self) -> [usize; 4] {
        [
            self.out_channels,
            self.in_channels,
            self.kernel_size,
            self.kernel_size,
        ]
    }
}

impl MaxPool2d {
    pub fn new(kernel_size: usize) -> Self {
        MaxPool2d {
            kernel_size,
            stride: None,
            padding: 0,
        }
    }

    pub fn effective_stride(&self) -> usize {
        self.stride.unwrap_or(self.kernel_size)
    }
}

impl Linear {
    /// Fresh layer with PyTorch's default `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` init.
    pub fn init(in_features: usize, out_features: usize, rng: &mut impl Rng) -> Self {
        Linear {
            in_features,
            out_features,
            weight: uniform(rng, out_features * in_features, in_features),
            bias: uniform(rng, out_features, in_features),
        }
    }
}

impl Layer {
    /// Operator name used in errors and in exported node names.
    pub fn op_name(&self) -> &'static str {
        match self {
            Layer::Conv2d(_) => "Conv",
            Layer::Relu => "Relu",
            Layer::MaxPool2d(_) => "MaxPool",
            Layer::Flatten => "Flatten",
            Layer::Linear(_) => "Gemm",
        }
    }

    /// Per-sample output shape for a per-sample input shape.
    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match self {
            Layer::Conv2d(conv) => {
                let [c, h, w] = expect_chw(self, input)?;
                if c != conv.in_channels {
                    return Err(Error::InvalidModel(format!(
                        "Conv expects {} input channels, got {}",
                        conv.in_channels, c
                    )));
                }
                let (oh, ow) =
                    window_dims("Conv", (h, w), conv.kernel_size, conv.stride, conv.padding)?;
                Ok(vec![conv.out_channels, oh, ow])
            }
            Layer::MaxPool2d(pool) => {
                let [c, h, w] = expect_chw(self, input)?;
                let (oh, ow) = window_dims(
                    "MaxPool",
                    (h, w),
                    pool.kernel_size,
                    pool.effective_stride(),
                    pool.padding,
                )?;
                Ok(vec![c, oh, ow])
            }
            Layer::Relu => Ok(input.to_vec()),
            Layer::Flatten => Ok(vec![input.iter().product()]),
            Layer::Linear(linear) => match input {
                [features] if *features == linear.in_features => Ok(vec![linear.out_features]),
                _ => Err(Error::InvalidModel(format!(
                    "Gemm expects [{}] input, got {:?}",
                    linear.in_features, input
                ))),
            },
        }
    }

    fn validate_weights(&self) -> Result<()> {
        let (expected_weight, weight, expected_bias, bias) = match self {
            Layer::Conv2d(conv) => (
                conv.weight_shape().iter().product::<usize>(),
                conv.weight.len(),
                conv.out_channels,
                conv.bias.len(),
            ),
            Layer::Linear(linear) => (
                linear.out_features * linear.in_features,
                linear.weight.len(),
                linear.out_features,
                linear.bias.len(),
            ),
            _ => return Ok(()),
        };
        if expected_weight != weight || expected_bias != bias {
            return Err(Error::InvalidModel(format!(
                "{} expects {} weights and {} biases, got {} and {}",
                self.op_name(),
                expected_weight,
                expected_bias,
                weight,
                bias
            )));
        }
        Ok(())
    }
}

fn expect_chw(layer: &Layer, input: &[usize]) -> Result<[usize; 3]> {
    match input {
        [c, h, w] => Ok([*c, *h, *w]),
        _ => Err(Error::InvalidModel(format!(
            "{} expects a CHW input, got {:?}",
            layer.op_name(),
            input
        ))),
    }
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Sequential { layers }
    }

    pub fn from_json(json_str: &str) -> Result<Self> {
        let model: Sequential = serde_json::from_str(json_str)?;
        Ok(model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks weight sizes and the shape chain for a per-sample input shape,
    /// returning the per-sample output shape.
    pub fn validate(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if self.layers.is_empty() {
            return Err(Error::InvalidModel("model has no layers".into()));
        }
        let mut shape = input_shape.to_vec();
        for layer in &self.layers {
            layer.validate_weights()?;
            shape = layer.output_shape(&shape)?;
        }
        Ok(shape)
    }

    /// Total number of learnable values.
    pub fn num_params(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                Layer::Conv2d(conv) => conv.weight.len() + conv.bias.len(),
                Layer::Linear(linear) => linear.weight.len() + linear.bias.len(),
                _ => 0,
            })
            .sum()
    }
}
