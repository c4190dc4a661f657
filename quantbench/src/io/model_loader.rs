// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Loads ONNX artifacts into tract and compiles runnable plans.

use crate::error::Result;
use std::io::Cursor;
use tract_onnx::prelude::*;

pub type TractRunnableModel =
    RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Parses serialized ONNX bytes into an (unoptimized) tract inference model.
pub fn load_onnx_model(model_bytes: &[u8]) -> Result<InferenceModel> {
    let mut reader = Cursor::new(model_bytes);
    Ok(tract_onnx::onnx().model_for_read(&mut reader)?)
}

/// Pins the first input to `input_dims` and compiles an optimized plan for it.
///
/// # Arguments
/// * `model` - Parsed model; left untouched, a clone is specialized.
/// * `input_dims` - Concrete shape of the first input, batch dimension included.
pub fn compile_for_input(model: &InferenceModel, input_dims: &[usize]) -> Result<TractRunnableModel> {
    let plan = model
        .clone()
        .with_input_fact(0, f32::fact(input_dims.to_vec()).into())?
        .into_optimized()?
        .into_runnable()?;
    Ok(plan)
}
