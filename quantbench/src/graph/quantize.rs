// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Weight-only 8-bit quantization of ONNX artifacts.

use crate::error::{Error, Result};
use crate::graph::proto::{self, OPSET_VERSION};
use crate::io;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tract_onnx::pb::{tensor_proto::DataType, GraphProto, ModelProto, NodeProto, TensorProto};
use tracing::{info, warn};

pub const QUANTIZED_SUFFIX: &str = "quant";

/// Opset that introduced `DequantizeLinear`.
const DEQUANTIZE_MIN_OPSET: i64 = 10;

/// Ops whose second input is a weight worth quantizing.
const WEIGHT_OPS: [&str; 3] = ["Conv", "Gemm", "MatMul"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantType {
    /// Signed, symmetric around zero.
    #[default]
    #[serde(rename = "qint8")]
    QInt8,
    /// Unsigned, asymmetric over the observed range.
    #[serde(rename = "quint8")]
    QUInt8,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuantizeOptions {
    pub quant_type: QuantType,
    /// Directory the quantized artifact is also copied into.
    pub save_to: Option<PathBuf>,
}

/// Per-tensor quantization of a weight.
#[derive(Clone, Debug, PartialEq)]
pub enum QuantizedWeight {
    Signed {
        values: Vec<i8>,
        scale: f32,
        zero_point: i8,
    },
    Unsigned {
        values: Vec<u8>,
        scale: f32,
        zero_point: u8,
    },
}

impl QuantizedWeight {
    pub fn scale(&self) -> f32 {
        match self {
            QuantizedWeight::Signed { scale, .. } | QuantizedWeight::Unsigned { scale, .. } => {
                *scale
            }
        }
    }

    /// `(q - zero_point) * scale` for every value.
    pub fn dequantize(&self) -> Vec<f32> {
        match self {
            QuantizedWeight::Signed {
                values,
                scale,
                zero_point,
            } => values
                .iter()
                .map(|q| (*q as f32 - *zero_point as f32) * scale)
                .collect(),
            QuantizedWeight::Unsigned {
                values,
                scale,
                zero_point,
            } => values
                .iter()
                .map(|q| (*q as f32 - *zero_point as f32) * scale)
                .collect(),
        }
    }
}

fn nonzero_scale(scale: f32) -> f32 {
    if scale > 0.0 && scale.is_finite() {
        scale
    } else {
        1.0
    }
}

pub fn quantize_values(values: &[f32], quant_type: QuantType) -> QuantizedWeight {
    match quant_type {
        QuantType::QInt8 => {
            let max_abs = values.iter().fold(0f32, |m, v| m.max(v.abs()));
            let scale = nonzero_scale(max_abs / 127.0);
            QuantizedWeight::Signed {
                values: values
                    .iter()
                    .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
                    .collect(),
                scale,
                zero_point: 0,
            }
        }
        QuantType::QUInt8 => {
            // The range always contains zero so that it stays exactly representable.
            let lo = values.iter().fold(0f32, |m, v| m.min(*v));
            let hi = values.iter().fold(0f32, |m, v| m.max(*v));
            let scale = nonzero_scale((hi - lo) / 255.0);
            let zero_point = (-lo / scale).round().clamp(0.0, 255.0);
            QuantizedWeight::Unsigned {
                values: values
                    .iter()
                    .map(|v| (v / scale + zero_point).round().clamp(0.0, 255.0) as u8)
                    .collect(),
                scale,
                zero_point: zero_point as u8,
            }
        }
    }
}

/// Names of float initializers with at least two dims read as a weight.
fn weight_initializers(graph: &GraphProto) -> Vec<String> {
    let candidates: HashSet<&str> = graph
        .node
        .iter()
        .filter(|n| WEIGHT_OPS.contains(&n.op_type.as_str()))
        .filter_map(|n| n.input.get(1).map(|s| s.as_str()))
        .collect();
    graph
        .initializer
        .iter()
        .filter(|t| {
            candidates.contains(t.name.as_str())
                && t.dims.len() >= 2
                && t.data_type == DataType::Float as i32
        })
        .map(|t| t.name.clone())
        .collect()
}

fn dequantize_node(name: &str) -> (NodeProto, [String; 3]) {
    let inputs = [
        format!("{}_quantized", name),
        format!("{}_scale", name),
        format!("{}_zero_point", name),
    ];
    let node = proto::node(
        "DequantizeLinear",
        &format!("{}_DequantizeLinear", name),
        &[&inputs[0], &inputs[1], &inputs[2]],
        &[name],
        vec![],
    );
    (node, inputs)
}

fn quantized_initializers(
    tensor: &TensorProto,
    names: &[String; 3],
    quant_type: QuantType,
) -> Result<[TensorProto; 3]> {
    let dims: Vec<usize> = tensor.dims.iter().map(|d| (*d).max(0) as usize).collect();
    let quantized = quantize_values(&proto::f32_values(tensor)?, quant_type);
    let scale = proto::tensor_f32(&names[1], &[], &[quantized.scale()]);
    Ok(match quantized {
        QuantizedWeight::Signed {
            values, zero_point, ..
        } => [
            proto::tensor_i8(&names[0], &dims, &values),
            scale,
            proto::tensor_i8(&names[2], &[], &[zero_point]),
        ],
        QuantizedWeight::Unsigned {
            values, zero_point, ..
        } => [
            proto::tensor_u8(&names[0], &dims, &values),
            scale,
            proto::tensor_u8(&names[2], &[], &[zero_point]),
        ],
    })
}

fn default_opset(model: &ModelProto) -> i64 {
    model
        .opset_import
        .iter()
        .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
        .map_or(OPSET_VERSION, |o| o.version)
}

/// Replaces every weight initializer with its 8-bit form plus a leading
/// `DequantizeLinear` node that restores the original tensor name.
///
/// # Returns
/// Number of quantized tensors.
pub fn quantize_graph(graph: &mut GraphProto, quant_type: QuantType) -> Result<usize> {
    let weights = weight_initializers(graph);
    let targets: HashSet<&str> = weights.iter().map(|s| s.as_str()).collect();

    let mut dequantize_nodes = Vec::with_capacity(weights.len());
    let mut initializers = Vec::with_capacity(graph.initializer.len() + 2 * weights.len());
    for tensor in &graph.initializer {
        if !targets.contains(tensor.name.as_str()) {
            initializers.push(tensor.clone());
            continue;
        }
        let (node, names) = dequantize_node(&tensor.name);
        initializers.extend(quantized_initializers(tensor, &names, quant_type)?);
        dequantize_nodes.push(node);
    }

    graph.initializer = initializers;
    graph.input.retain(|i| !targets.contains(i.name.as_str()));
    dequantize_nodes.append(&mut graph.node);
    graph.node = dequantize_nodes;
    Ok(weights.len())
}

/// Quantizes the weights of the artifact at `model_path` and writes
/// `<stem>_quant.<ext>` next to it.
///
/// # Arguments
/// * `model_path` - Source artifact, left untouched.
/// * `options` - Target integer type and optional publish directory.
///
/// # Returns
/// Path of the quantized artifact.
pub fn quantize_model(model_path: impl AsRef<Path>, options: &QuantizeOptions) -> Result<PathBuf> {
    let model_path = model_path.as_ref();
    info!("Quantize :: Model - {}", model_path.display());
    let mut model = proto::load_model(model_path)?;
    let opset = default_opset(&model);
    if opset < DEQUANTIZE_MIN_OPSET {
        return Err(Error::InvalidModel(format!(
            "opset {} predates DequantizeLinear (opset {})",
            opset, DEQUANTIZE_MIN_OPSET
        )));
    }

    let quantized = quantize_graph(proto::graph_mut(&mut model)?, options.quant_type)?;
    if quantized == 0 {
        warn!("Quantize :: no weight initializers found");
    }

    let quantized_path = proto::derived_path(model_path, QUANTIZED_SUFFIX);
    proto::save_model(&model, &quantized_path)?;
    info!(
        "Quantize :: {} tensors as {:?}, wrote {}",
        quantized,
        options.quant_type,
        quantized_path.display()
    );

    if let Some(dir) = &options.save_to {
        io::publish(&quantized_path, dir)?;
    }
    Ok(quantized_path)
}
