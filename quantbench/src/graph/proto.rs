// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Helpers for building, reading and writing ONNX protobuf messages.
//!
//! Messages are tract's prost-generated `pb` types; reading goes through
//! tract's loader and writing through `prost::Message::encode_to_vec`.

use crate::error::{Error, Result};
use prost::Message;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tract_onnx::pb::{
    attribute_proto::AttributeType, tensor_proto::DataType, tensor_shape_proto, type_proto,
    AttributeProto, GraphProto, ModelProto, NodeProto, TensorProto, TensorShapeProto, TypeProto,
    OperatorSetIdProto, ValueInfoProto,
};
use tract_onnx::prelude::Framework;

/// Operator set every artifact targets.
pub const OPSET_VERSION: i64 = 11;
/// IR version matching `OPSET_VERSION`.
pub const IR_VERSION: i64 = 6;

/// One dimension of a tensor type: fixed, or named and variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    Param(String),
}

/// Wraps `graph` in a `ModelProto` targeting [`OPSET_VERSION`].
pub fn model(graph: GraphProto) -> ModelProto {
    ModelProto {
        ir_version: IR_VERSION,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
        }],
        producer_name: env!("CARGO_PKG_NAME").to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        graph: Some(graph),
        ..Default::default()
    }
}

pub fn load_model(path: impl AsRef<Path>) -> Result<ModelProto> {
    Ok(tract_onnx::onnx().proto_model_for_path(path)?)
}

pub fn decode_model(bytes: &[u8]) -> Result<ModelProto> {
    Ok(ModelProto::decode(bytes)?)
}

pub fn save_model(model: &ModelProto, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, model.encode_to_vec())?;
    Ok(())
}

pub fn graph(model: &ModelProto) -> Result<&GraphProto> {
    model
        .graph
        .as_ref()
        .ok_or_else(|| Error::InvalidModel("model has no graph".into()))
}

pub fn graph_mut(model: &mut ModelProto) -> Result<&mut GraphProto> {
    model
        .graph
        .as_mut()
        .ok_or_else(|| Error::InvalidModel("model has no graph".into()))
}

/// `dir/stem.ext` -> `dir/stem_<suffix>.ext`.
pub fn derived_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(file_name)
}

fn raw_tensor(name: &str, dims: &[usize], data_type: DataType, raw_data: Vec<u8>) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: dims.iter().map(|d| *d as i64).collect(),
        data_type: data_type as i32,
        raw_data,
        ..Default::default()
    }
}

pub fn tensor_f32(name: &str, dims: &[usize], values: &[f32]) -> TensorProto {
    let raw = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    raw_tensor(name, dims, DataType::Float, raw)
}

pub fn tensor_i8(name: &str, dims: &[usize], values: &[i8]) -> TensorProto {
    let raw = values.iter().map(|v| *v as u8).collect();
    raw_tensor(name, dims, DataType::Int8, raw)
}

pub fn tensor_u8(name: &str, dims: &[usize], values: &[u8]) -> TensorProto {
    raw_tensor(name, dims, DataType::Uint8, values.to_vec())
}

/// Decodes the values of a float tensor stored either as `raw_data` or `float_data`.
pub fn f32_values(tensor: &TensorProto) -> Result<Vec<f32>> {
    if tensor.data_type != DataType::Float as i32 {
        return Err(Error::InvalidModel(format!(
            "tensor '{}' is not float (data type {})",
            tensor.name, tensor.data_type
        )));
    }
    if tensor.raw_data.is_empty() {
        return Ok(tensor.float_data.clone());
    }
    if tensor.raw_data.len() % 4 != 0 {
        return Err(Error::InvalidModel(format!(
            "tensor '{}' has {} raw bytes",
            tensor.name,
            tensor.raw_data.len()
        )));
    }
    Ok(tensor
        .raw_data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Number of elements a tensor declares; a scalar counts as one.
pub fn element_count(tensor: &TensorProto) -> u64 {
    tensor.dims.iter().map(|d| (*d).max(0) as u64).product()
}

pub fn attr_int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

pub fn attr_ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    }
}

pub fn attr_float(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Float as i32,
        f: value,
        ..Default::default()
    }
}

pub fn node(
    op_type: &str,
    name: &str,
    inputs: &[&str],
    outputs: &[&str],
    attribute: Vec<AttributeProto>,
) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        name: name.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        attribute,
        ..Default::default()
    }
}

pub fn float_value_info(name: &str, dims: &[Dim]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| tensor_shape_proto::Dimension {
            value: Some(match d {
                Dim::Fixed(v) => tensor_shape_proto::dimension::Value::DimValue(*v as i64),
                Dim::Param(p) => tensor_shape_proto::dimension::Value::DimParam(p.clone()),
            }),
            ..Default::default()
        })
        .collect();
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Graph inputs that are fed at run time, i.e. not backed by an initializer.
pub fn runtime_inputs(graph: &GraphProto) -> Vec<&ValueInfoProto> {
    let initialized: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
    graph
        .input
        .iter()
        .filter(|i| !initialized.contains(i.name.as_str()))
        .collect()
}

/// Declared dims of a value; `None` for named or missing dimensions.
pub fn declared_dims(info: &ValueInfoProto) -> Vec<Option<usize>> {
    let shape = info.r#type.as_ref().and_then(|t| match &t.value {
        Some(type_proto::Value::TensorType(tensor)) => tensor.shape.as_ref(),
        _ => None,
    });
    shape
        .map(|s| {
            s.dim
                .iter()
                .map(|d| match d.value {
                    Some(tensor_shape_proto::dimension::Value::DimValue(v)) if v > 0 => {
                        Some(v as usize)
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Name and declared dims of the single runtime input of a model.
pub fn primary_input(model: &ModelProto) -> Result<(String, Vec<Option<usize>>)> {
    let graph = graph(model)?;
    let input = runtime_inputs(graph)
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidModel("model declares no runtime input".into()))?;
    Ok((input.name.clone(), declared_dims(input)))
}
