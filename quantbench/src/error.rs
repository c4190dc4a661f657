// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Error type shared by every quantbench operation.

use crate::inference::ExecutionProvider;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The artifact path does not point at an existing file.
    #[error("the file '{}' does not exist", .0.display())]
    ModelNotFound(PathBuf),

    /// The simplified graph disagrees with the original on the probe input.
    #[error("simplified ONNX model could not be validated (max abs diff {max_abs_diff})")]
    EquivalenceCheckFailed { max_abs_diff: f32 },

    #[error("execution provider '{0}' is not available")]
    ProviderUnavailable(ExecutionProvider),

    #[error("dataset yielded no batches")]
    EmptyDataset,

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tract(#[from] tract_onnx::prelude::TractError),

    #[error(transparent)]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Download(#[from] reqwest::Error),

    #[error(transparent)]
    Shape(#[from] tract_onnx::prelude::tract_ndarray::ShapeError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}
