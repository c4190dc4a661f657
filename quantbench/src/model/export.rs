// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Exports an in-memory `Sequential` classifier to an ONNX artifact.

use crate::determinism::Determinism;
use crate::error::{Error, Result};
use crate::graph::proto::{self, Dim, OPSET_VERSION};
use crate::inference::{InferenceSession, TractSession};
use crate::io;
use crate::model::sequential::{Layer, Sequential};
use crate::model::INPUT_SHAPE;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tract_onnx::pb::{GraphProto, ModelProto, NodeProto, TensorProto};
use tracing::{debug, info};

pub const INPUT_NAME: &str = "input";
pub const OUTPUT_NAME: &str = "output";
pub const BATCH_DIM_PARAM: &str = "batch_size";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Batch size of the probe input, and of the artifact when `dynamic` is off.
    pub batch_size: usize,
    /// Marks the batch dimension of `input` and `output` as variable.
    pub dynamic: bool,
    /// Directory the finished artifact is also copied into.
    pub save_to: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            batch_size: 1,
            dynamic: false,
            save_to: None,
        }
    }
}

/// Exports `model` to `model_path`.
///
/// 1. Validate the layer chain for a `[batch_size, 3, 32, 32]` input.
/// 2. Build the ONNX graph with embedded weights and named input/output.
/// 3. Run one forward pass of the built graph on a seeded random input; the
///    output is discarded.
/// 4. Write it, and publish a copy when `save_to` is set.
///
/// # Arguments
/// * `model` - Classifier to export. Borrowed, never modified.
/// * `model_path` - Destination of the artifact.
/// * `options` - Batch size, dynamic batch flag and optional publish directory.
/// * `determinism` - Source of the probe input.
pub fn export_model(
    model: &Sequential,
    model_path: impl AsRef<Path>,
    options: &ExportOptions,
    determinism: &Determinism,
) -> Result<()> {
    let model_path = model_path.as_ref();
    if options.batch_size == 0 {
        return Err(Error::InvalidInput(
            "export batch size must be at least 1".into(),
        ));
    }
    let output_shape = model.validate(&INPUT_SHAPE)?;
    let onnx_model = to_onnx(model, &output_shape, options)?;
    let model_bytes = onnx_model.encode_to_vec();

    let mut probe_shape = vec![options.batch_size];
    probe_shape.extend_from_slice(&INPUT_SHAPE);
    let probe = determinism.randn(&probe_shape);
    let probe_out = TractSession::from_bytes(&model_bytes)?.run(probe)?;
    debug!("Export :: probe forward pass produced {:?}", probe_out.shape());

    std::fs::write(model_path, &model_bytes)?;
    info!(
        "Export :: wrote {} ({} nodes, opset {})",
        model_path.display(),
        onnx_model.graph.as_ref().map_or(0, |g| g.node.len()),
        OPSET_VERSION
    );

    if let Some(dir) = &options.save_to {
        io::publish(model_path, dir)?;
    }
    Ok(())
}

fn batch_dim(options: &ExportOptions) -> Dim {
    if options.dynamic {
        Dim::Param(BATCH_DIM_PARAM.to_string())
    } else {
        Dim::Fixed(options.batch_size)
    }
}

/// Builds the `ModelProto` for an already validated model.
pub fn to_onnx(
    model: &Sequential,
    output_shape: &[usize],
    options: &ExportOptions,
) -> Result<ModelProto> {
    let mut nodes: Vec<NodeProto> = Vec::with_capacity(model.layers.len());
    let mut initializers: Vec<TensorProto> = Vec::new();
    let mut current = INPUT_NAME.to_string();
    let last = model
        .layers
        .len()
        .checked_sub(1)
        .ok_or_else(|| Error::InvalidModel("model has no layers".into()))?;

    for (idx, layer) in model.layers.iter().enumerate() {
        let name = format!("{}_{}", layer.op_name(), idx);
        let output = if idx == last {
            OUTPUT_NAME.to_string()
        } else {
            format!("onnx::{}_{}", layer.op_name(), idx)
        };
        let node = match layer {
            Layer::Conv2d(conv) => {
                let weight = format!("layers.{}.weight", idx);
                let bias = format!("layers.{}.bias", idx);
                initializers.push(proto::tensor_f32(&weight, &conv.weight_shape(), &conv.weight));
                initializers.push(proto::tensor_f32(&bias, &[conv.out_channels], &conv.bias));
                let (k, s, p) = (
                    conv.kernel_size as i64,
                    conv.stride as i64,
                    conv.padding as i64,
                );
                proto::node(
                    "Conv",
                    &name,
                    &[&current, &weight, &bias],
                    &[&output],
                    vec![
                        proto::attr_ints("dilations", &[1, 1]),
                        proto::attr_int("group", 1),
                        proto::attr_ints("kernel_shape", &[k, k]),
                        proto::attr_ints("pads", &[p, p, p, p]),
                        proto::attr_ints("strides", &[s, s]),
                    ],
                )
            }
            Layer::MaxPool2d(pool) => {
                let (k, s, p) = (
                    pool.kernel_size as i64,
                    pool.effective_stride() as i64,
                    pool.padding as i64,
                );
                proto::node(
                    "MaxPool",
                    &name,
                    &[&current],
                    &[&output],
                    vec![
                        proto::attr_ints("kernel_shape", &[k, k]),
                        proto::attr_ints("pads", &[p, p, p, p]),
                        proto::attr_ints("strides", &[s, s]),
                    ],
                )
            }
            Layer::Relu => proto::node("Relu", &name, &[&current], &[&output], vec![]),
            Layer::Flatten => proto::node(
                "Flatten",
                &name,
                &[&current],
                &[&output],
                vec![proto::attr_int("axis", 1)],
            ),
            Layer::Linear(linear) => {
                let weight = format!("layers.{}.weight", idx);
                let bias = format!("layers.{}.bias", idx);
                initializers.push(proto::tensor_f32(
                    &weight,
                    &[linear.out_features, linear.in_features],
                    &linear.weight,
                ));
                initializers.push(proto::tensor_f32(&bias, &[linear.out_features], &linear.bias));
                proto::node(
                    "Gemm",
                    &name,
                    &[&current, &weight, &bias],
                    &[&output],
                    vec![
                        proto::attr_float("alpha", 1.0),
                        proto::attr_float("beta", 1.0),
                        proto::attr_int("transB", 1),
                    ],
                )
            }
        };
        nodes.push(node);
        current = output;
    }

    let mut input_dims = vec![batch_dim(options)];
    input_dims.extend(INPUT_SHAPE.iter().map(|d| Dim::Fixed(*d)));
    let mut output_dims = vec![batch_dim(options)];
    output_dims.extend(output_shape.iter().map(|d| Dim::Fixed(*d)));

    Ok(proto::model(GraphProto {
        name: "main_graph".to_string(),
        node: nodes,
        initializer: initializers,
        input: vec![proto::float_value_info(INPUT_NAME, &input_dims)],
        output: vec![proto::float_value_info(OUTPUT_NAME, &output_dims)],
        ..Default::default()
    }))
}
