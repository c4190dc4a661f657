// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

pub mod dataset_config;
pub mod pipeline_config;

pub use dataset_config::*;
pub use pipeline_config::*;
