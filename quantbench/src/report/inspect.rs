// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

use crate::error::{Error, Result};
use crate::graph::proto;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Elements across all initializers.
    pub params: u64,
    /// Human readable file size.
    pub model_size: String,
}

/// Formats a byte count with two decimals in the largest fitting binary unit.
pub fn format_size(bytes: u64) -> String {
    if bytes < KB {
        format!("{} bytes", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Parameter count and file size of an ONNX artifact.
///
/// A missing file is reported as `Error::ModelNotFound` before anything is read.
pub fn model_info(model_path: impl AsRef<Path>) -> Result<ModelInfo> {
    let model_path = model_path.as_ref();
    if !model_path.is_file() {
        return Err(Error::ModelNotFound(model_path.to_path_buf()));
    }
    let bytes = std::fs::metadata(model_path)?.len();
    let model = proto::load_model(model_path)?;
    let params = proto::graph(&model)?
        .initializer
        .iter()
        .map(proto::element_count)
        .sum();

    let info = ModelInfo {
        params,
        model_size: format_size(bytes),
    };
    info!("Inspect :: Model - {}", model_path.display());
    info!(
        "Inspect :: params = {}, model size = {}",
        info.params, info.model_size
    );
    Ok(info)
}
