// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Graph-level simplification of ONNX artifacts.
//!
//! The passes only remove or rewire structure, they never change numerics,
//! and every simplified graph is checked against the original on a random
//! probe before it is written.

use crate::determinism::Determinism;
use crate::error::{Error, Result};
use crate::graph::proto;
use crate::inference::TractSession;
use crate::io;
use prost::Message;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tract_onnx::pb::{attribute_proto::AttributeType, GraphProto, NodeProto, TensorProto};
use tract_onnx::prelude::*;
use tracing::{debug, info};

pub const SIMPLIFIED_SUFFIX: &str = "sim";

#[derive(Clone, Debug, PartialEq)]
pub struct SimplifyOptions {
    /// Absolute tolerance of the equivalence check.
    pub atol: f32,
    /// Relative tolerance of the equivalence check, scaled by the original output.
    pub rtol: f32,
    /// Directory the simplified artifact is also copied into.
    pub save_to: Option<PathBuf>,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        SimplifyOptions {
            atol: 1e-5,
            rtol: 1e-4,
            save_to: None,
        }
    }
}

/// What the passes changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub constants_lifted: usize,
    pub noops_removed: usize,
    pub dead_nodes_removed: usize,
    pub initializers_merged: usize,
    pub initializers_pruned: usize,
    pub inputs_pruned: usize,
}

/// Simplifies the artifact at `model_path` and writes `<stem>_sim.<ext>` next to it.
///
/// 1. Parse the `ModelProto` and run the passes of [`simplify_graph`].
/// 2. Run the original and the simplified graph on the same seeded standard
///    normal probe. The batch dimension is the declared one, or 1 if variable.
/// 3. Fail with `Error::EquivalenceCheckFailed` when any output element is
///    out of tolerance; nothing is written in that case.
/// 4. Write the simplified artifact, and publish a copy when `save_to` is set.
///
/// # Returns
/// Path of the simplified artifact.
pub fn simplify_model(
    model_path: impl AsRef<Path>,
    options: &SimplifyOptions,
    determinism: &Determinism,
) -> Result<PathBuf> {
    let model_path = model_path.as_ref();
    info!("Simplify :: Model - {}", model_path.display());
    let original_bytes = std::fs::read(model_path)?;
    let mut model = proto::decode_model(&original_bytes)?;

    let stats = simplify_graph(proto::graph_mut(&mut model)?);
    debug!("Simplify :: {:?}", stats);
    let simplified_bytes = model.encode_to_vec();

    let (_, dims) = proto::primary_input(&model)?;
    let probe_shape = probe_shape(&dims)?;
    let probe = determinism.randn(&probe_shape);
    let expected = TractSession::from_bytes(&original_bytes)?.run_all(probe.clone())?;
    let actual = TractSession::from_bytes(&simplified_bytes)?.run_all(probe)?;
    check_outputs(&expected, &actual, options.atol, options.rtol)?;

    let simplified_path = proto::derived_path(model_path, SIMPLIFIED_SUFFIX);
    std::fs::write(&simplified_path, &simplified_bytes)?;
    info!(
        "Simplify :: nodes {} -> {}, wrote {}",
        stats.nodes_before,
        stats.nodes_after,
        simplified_path.display()
    );

    if let Some(dir) = &options.save_to {
        io::publish(&simplified_path, dir)?;
    }
    Ok(simplified_path)
}

fn probe_shape(dims: &[Option<usize>]) -> Result<Vec<usize>> {
    dims.iter()
        .enumerate()
        .map(|(axis, dim)| match (axis, dim) {
            (_, Some(d)) => Ok(*d),
            (0, None) => Ok(1),
            (_, None) => Err(Error::InvalidModel(format!(
                "input dimension {} is not fixed",
                axis
            ))),
        })
        .collect()
}

/// Applies [`check_equivalence`] to every graph output; a differing output
/// count fails as well.
pub fn check_outputs(expected: &[Tensor], actual: &[Tensor], atol: f32, rtol: f32) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(Error::EquivalenceCheckFailed {
            max_abs_diff: f32::INFINITY,
        });
    }
    let mut max_abs_diff = 0f32;
    let mut within = true;
    for (e, a) in expected.iter().zip(actual) {
        match check_equivalence(e, a, atol, rtol) {
            Ok(()) => {}
            Err(Error::EquivalenceCheckFailed { max_abs_diff: diff }) => {
                within = false;
                max_abs_diff = max_abs_diff.max(diff);
            }
            Err(other) => return Err(other),
        }
    }
    if within {
        Ok(())
    } else {
        Err(Error::EquivalenceCheckFailed { max_abs_diff })
    }
}

/// Checks `|actual - expected| <= atol + rtol * |expected|` element-wise.
pub fn check_equivalence(expected: &Tensor, actual: &Tensor, atol: f32, rtol: f32) -> Result<()> {
    if expected.shape() != actual.shape() {
        return Err(Error::EquivalenceCheckFailed {
            max_abs_diff: f32::INFINITY,
        });
    }
    let expected = expected.to_array_view::<f32>()?;
    let actual = actual.to_array_view::<f32>()?;
    let mut max_abs_diff = 0f32;
    let mut within = true;
    for (e, a) in expected.iter().zip(actual.iter()) {
        let diff = (a - e).abs();
        max_abs_diff = max_abs_diff.max(diff);
        // NaN differences fail as well.
        if !(diff <= atol + rtol * e.abs()) {
            within = false;
        }
    }
    if within {
        Ok(())
    } else {
        Err(Error::EquivalenceCheckFailed { max_abs_diff })
    }
}

/// Runs every pass in order and reports what changed.
pub fn simplify_graph(graph: &mut GraphProto) -> SimplifyStats {
    let mut stats = SimplifyStats {
        nodes_before: graph.node.len(),
        ..Default::default()
    };
    stats.constants_lifted = lift_constants(graph);
    stats.noops_removed = eliminate_noops(graph);
    stats.dead_nodes_removed = eliminate_dead_nodes(graph);
    stats.initializers_merged = merge_duplicate_initializers(graph);
    let (initializers_pruned, inputs_pruned) = prune_unused(graph);
    stats.initializers_pruned = initializers_pruned;
    stats.inputs_pruned = inputs_pruned;
    stats.nodes_after = graph.node.len();
    stats
}

fn constant_tensor(node: &NodeProto) -> Option<TensorProto> {
    if node.op_type != "Constant" || node.output.len() != 1 || node.attribute.len() != 1 {
        return None;
    }
    let attr = &node.attribute[0];
    if attr.name != "value" || attr.r#type != AttributeType::Tensor as i32 {
        return None;
    }
    let mut tensor = attr.t.clone()?;
    tensor.name = node.output[0].clone();
    Some(tensor)
}

/// Turns `Constant` nodes holding a tensor into initializers.
pub fn lift_constants(graph: &mut GraphProto) -> usize {
    let mut lifted = 0;
    let mut kept = Vec::with_capacity(graph.node.len());
    for node in graph.node.drain(..) {
        match constant_tensor(&node) {
            Some(tensor) => {
                graph.initializer.push(tensor);
                lifted += 1;
            }
            None => kept.push(node),
        }
    }
    graph.node = kept;
    lifted
}

fn rename_uses(graph: &mut GraphProto, from: &str, to: &str) {
    for node in graph.node.iter_mut() {
        for input in node.input.iter_mut() {
            if *input == from {
                *input = to.to_string();
            }
        }
    }
}

fn is_noop(node: &NodeProto) -> bool {
    match node.op_type.as_str() {
        "Identity" => node.input.len() == 1 && node.output.len() == 1,
        // Only the data output of Dropout is a pass-through at inference.
        "Dropout" => {
            !node.input.is_empty()
                && !node.input[0].is_empty()
                && (node.output.len() == 1 || node.output[1..].iter().all(|o| o.is_empty()))
        }
        _ => false,
    }
}

/// Removes `Identity` and inference-mode `Dropout` nodes by rewiring their consumers.
pub fn eliminate_noops(graph: &mut GraphProto) -> usize {
    let mut removed = 0;
    let mut idx = 0;
    while idx < graph.node.len() {
        if !is_noop(&graph.node[idx]) {
            idx += 1;
            continue;
        }
        let source = graph.node[idx].input[0].clone();
        let target = graph.node[idx].output[0].clone();
        let graph_outputs: HashSet<&str> = graph.output.iter().map(|o| o.name.as_str()).collect();

        if !graph_outputs.contains(target.as_str()) {
            graph.node.remove(idx);
            rename_uses(graph, &target, &source);
            removed += 1;
            continue;
        }

        // The no-op feeds a graph output: its producer takes over the output
        // name, unless the source itself must stay visible.
        let producer = graph
            .node
            .iter()
            .position(|n| n.output.iter().any(|o| *o == source));
        match producer {
            Some(p) if !graph_outputs.contains(source.as_str()) => {
                graph.node.remove(idx);
                for output in graph.node[if p > idx { p - 1 } else { p }].output.iter_mut() {
                    if *output == source {
                        *output = target.clone();
                    }
                }
                rename_uses(graph, &source, &target);
                removed += 1;
            }
            _ => idx += 1,
        }
    }
    removed
}

fn subgraph_inputs(node: &NodeProto, names: &mut HashSet<String>) {
    for attr in &node.attribute {
        for graph in attr.g.iter().chain(attr.graphs.iter()) {
            for inner in &graph.node {
                names.extend(inner.input.iter().cloned());
                subgraph_inputs(inner, names);
            }
        }
    }
}

/// Removes nodes none of whose outputs reach a graph output.
pub fn eliminate_dead_nodes(graph: &mut GraphProto) -> usize {
    let mut live: HashSet<String> = graph.output.iter().map(|o| o.name.clone()).collect();
    let mut keep = vec![false; graph.node.len()];
    for (idx, node) in graph.node.iter().enumerate().rev() {
        if node.output.iter().any(|o| live.contains(o)) {
            keep[idx] = true;
            live.extend(node.input.iter().cloned());
            subgraph_inputs(node, &mut live);
        }
    }
    let before = graph.node.len();
    let mut flags = keep.into_iter();
    graph.node.retain(|_| flags.next().unwrap_or(false));
    before - graph.node.len()
}

fn content_key(tensor: &TensorProto) -> Vec<u8> {
    let mut unnamed = tensor.clone();
    unnamed.name.clear();
    unnamed.doc_string.clear();
    unnamed.encode_to_vec()
}

/// Points every use of a duplicated initializer at its first occurrence and
/// drops the duplicate along with its graph-input and value-info entries.
pub fn merge_duplicate_initializers(graph: &mut GraphProto) -> usize {
    let graph_outputs: HashSet<String> = graph.output.iter().map(|o| o.name.clone()).collect();
    let mut first_by_content: HashMap<Vec<u8>, String> = HashMap::new();
    let mut replaced: Vec<(String, String)> = Vec::new();
    for tensor in &graph.initializer {
        if graph_outputs.contains(&tensor.name) {
            continue;
        }
        let key = content_key(tensor);
        match first_by_content.get(&key) {
            Some(first) => replaced.push((tensor.name.clone(), first.clone())),
            None => {
                first_by_content.insert(key, tensor.name.clone());
            }
        }
    }
    for (from, to) in &replaced {
        rename_uses(graph, from, to);
    }
    let dropped: HashSet<&String> = replaced.iter().map(|(from, _)| from).collect();
    graph.initializer.retain(|t| !dropped.contains(&t.name));
    graph.input.retain(|i| !dropped.contains(&i.name));
    graph.value_info.retain(|v| !dropped.contains(&v.name));
    replaced.len()
}

/// Drops initializers nothing reads, along with their graph-input and
/// value-info entries. Runtime inputs are part of the signature and stay.
pub fn prune_unused(graph: &mut GraphProto) -> (usize, usize) {
    let mut used: HashSet<String> = graph.output.iter().map(|o| o.name.clone()).collect();
    for node in &graph.node {
        used.extend(node.input.iter().cloned());
        subgraph_inputs(node, &mut used);
    }

    let before = graph.initializer.len();
    let mut pruned: HashSet<String> = HashSet::new();
    graph.initializer.retain(|t| {
        let keep = used.contains(&t.name);
        if !keep {
            pruned.insert(t.name.clone());
        }
        keep
    });
    let initializers_pruned = before - graph.initializer.len();

    let inputs_before = graph.input.len();
    graph.input.retain(|i| !pruned.contains(&i.name));
    let inputs_pruned = inputs_before - graph.input.len();

    let produced: HashSet<String> = graph
        .node
        .iter()
        .flat_map(|n| n.output.iter().cloned())
        .collect();
    graph.value_info.retain(|v| produced.contains(&v.name));

    (initializers_pruned, inputs_pruned)
}
