// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Dataset configuration, read from the `dataset` object of the pipeline JSON.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_calibration_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_num_workers() -> usize {
    2
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DatasetConfig {
    /// Download and extraction cache.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_calibration_size")]
    pub calibration_size: usize,
    /// Batch size of the evaluation loader.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker threads of the data runtime.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            data_dir: default_data_dir(),
            calibration_size: default_calibration_size(),
            batch_size: default_batch_size(),
            num_workers: default_num_workers(),
        }
    }
}
