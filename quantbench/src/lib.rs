// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Export, simplify, quantize, evaluate and benchmark CIFAR-10 classifiers
//! as ONNX artifacts.

pub mod config;
pub mod dataset;
pub mod determinism;
pub mod error;
pub mod graph;
pub mod inference;
pub mod io;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;

pub use config::{DatasetConfig, PipelineConfig};
pub use dataset::{prepare_test_data, split_indices, Batch, CalibrationSet, EvalLoader, PreparedData};
pub use determinism::Determinism;
pub use error::{Error, Result};
pub use graph::{quantize_model, simplify_model, QuantType, QuantizeOptions, SimplifyOptions};
pub use inference::{
    benchmark, evaluate_accuracy, AccuracyReport, BenchmarkOptions, BenchmarkReport,
    EvaluateOptions, ExecutionProvider, FallbackPolicy, InferenceSession, SessionFactory,
    TractSessionFactory,
};
pub use model::{export_model, ExportOptions, Sequential};
pub use report::{format_size, model_info, BarChart, BarSeries, ModelInfo};
