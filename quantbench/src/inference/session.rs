// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! CPU inference sessions backed by tract.

use crate::error::{Error, Result};
use crate::graph::proto;
use crate::inference::{ExecutionProvider, InferenceSession, SessionFactory};
use crate::io::{self, TractRunnableModel};
use std::collections::HashMap;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::debug;

/// A parsed ONNX artifact plus one optimized plan per batch size seen so far.
pub struct TractSession {
    model: InferenceModel,
    input_name: String,
    fixed_batch: Option<usize>,
    sample_dims: Vec<usize>,
    plans: HashMap<usize, TractRunnableModel>,
}

impl TractSession {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(model_path)?)
    }

    /// Builds a session from a serialized `ModelProto`.
    pub fn from_bytes(model_bytes: &[u8]) -> Result<Self> {
        let (input_name, dims) = proto::primary_input(&proto::decode_model(model_bytes)?)?;
        let (batch, rest) = dims.split_first().ok_or_else(|| {
            Error::InvalidModel(format!("input '{}' has no dimensions", input_name))
        })?;
        let sample_dims = rest
            .iter()
            .map(|d| {
                d.ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "input '{}' has a variable non-batch dimension",
                        input_name
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(TractSession {
            model: io::load_onnx_model(model_bytes)?,
            input_name,
            fixed_batch: *batch,
            sample_dims,
            plans: HashMap::new(),
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Batch size baked into the artifact, `None` when the batch dimension is variable.
    pub fn fixed_batch(&self) -> Option<usize> {
        self.fixed_batch
    }

    /// Per-sample input shape, batch dimension excluded.
    pub fn sample_dims(&self) -> &[usize] {
        &self.sample_dims
    }

    fn check_input(&self, shape: &[usize]) -> Result<()> {
        if shape.len() != self.sample_dims.len() + 1 || shape[1..] != self.sample_dims[..] {
            return Err(Error::InvalidInput(format!(
                "input '{}' expects [N, {:?}], got {:?}",
                self.input_name, self.sample_dims, shape
            )));
        }
        match self.fixed_batch {
            Some(batch) if batch != shape[0] => Err(Error::InvalidInput(format!(
                "input '{}' has a fixed batch size of {}, got {}",
                self.input_name, batch, shape[0]
            ))),
            _ => Ok(()),
        }
    }

    /// Runs `input` and returns every graph output, in declaration order.
    pub fn run_all(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
        let shape = input.shape().to_vec();
        self.check_input(&shape)?;
        if !self.plans.contains_key(&shape[0]) {
            debug!("Session :: compiling plan for input {:?}", shape);
            let plan = io::compile_for_input(&self.model, &shape)?;
            self.plans.insert(shape[0], plan);
        }
        let outputs = self.plans[&shape[0]].run(tvec!(TValue::Const(input.into_arc_tensor())))?;
        Ok(outputs.into_iter().map(|o| o.into_tensor()).collect())
    }
}

impl InferenceSession for TractSession {
    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }

    fn run(&mut self, input: Tensor) -> Result<Tensor> {
        self.run_all(input)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidModel("model produced no outputs".into()))
    }
}

/// Serves the CPU provider through tract. No accelerator backend is bundled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TractSessionFactory;

impl SessionFactory for TractSessionFactory {
    fn is_available(&self, provider: ExecutionProvider) -> bool {
        provider == ExecutionProvider::Cpu
    }

    fn create(
        &self,
        model_path: &Path,
        provider: ExecutionProvider,
    ) -> Result<Box<dyn InferenceSession>> {
        match provider {
            ExecutionProvider::Cpu => Ok(Box::new(TractSession::load(model_path)?)),
            other => Err(Error::ProviderUnavailable(other)),
        }
    }
}
