// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Pipeline configuration module to read the driver configuration from a JSON string.

use crate::config::DatasetConfig;
use crate::determinism::DEFAULT_SEED;
use crate::error::Result;
use crate::graph::QuantType;
use crate::inference::{BenchmarkOptions, EvaluateOptions, ExecutionProvider};
use crate::model::ExportOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_simplify() -> bool {
    true
}

fn default_export() -> ExportOptions {
    ExportOptions {
        dynamic: true,
        ..Default::default()
    }
}

fn default_benchmark() -> BenchmarkOptions {
    BenchmarkOptions {
        providers: vec![ExecutionProvider::Cpu],
        ..Default::default()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Artifact to evaluate. Written first when `model_definition_path` is set.
    pub model_path: PathBuf,
    /// `Sequential` JSON to export to `model_path`.
    #[serde(default)]
    pub model_definition_path: Option<PathBuf>,
    /// Defaults to a dynamic batch so the evaluation and benchmark batch sizes fit.
    #[serde(default = "default_export")]
    pub export: ExportOptions,
    #[serde(default = "default_simplify")]
    pub simplify: bool,
    #[serde(default)]
    pub quantize: Option<QuantType>,
    #[serde(default)]
    pub evaluate: EvaluateOptions,
    #[serde(default = "default_benchmark")]
    pub benchmark: BenchmarkOptions,
    /// Every produced artifact is also copied here.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default)]
    pub chart_path: Option<PathBuf>,
    /// Per-artifact reports are written here as JSON.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl PipelineConfig {
    pub fn from_json(json_str: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json_str)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::FallbackPolicy;

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{
            "seed": 7,
            "dataset": {"data_dir": "/data/cifar", "calibration_size": 50},
            "model_path": "models/model.onnx",
            "model_definition_path": "models/model.json",
            "export": {"batch_size": 4, "dynamic": true},
            "simplify": false,
            "quantize": "quint8",
            "evaluate": {"device": "cpu", "fallback": "fail"},
            "benchmark": {"batch_size": 10, "runs": 5, "providers": ["cpu", "accelerator"], "fallback": "use_cpu"},
            "save_dir": "out",
            "chart_path": "out/chart.svg",
            "report_path": "out/bench.json",
            "log_level": "debug"
        }"#;

        let config = PipelineConfig::from_json(json).unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.dataset.data_dir, PathBuf::from("/data/cifar"));
        assert_eq!(config.dataset.calibration_size, 50);
        assert_eq!(config.dataset.batch_size, 100);
        assert_eq!(config.model_path, PathBuf::from("models/model.onnx"));
        assert_eq!(
            config.model_definition_path,
            Some(PathBuf::from("models/model.json"))
        );
        assert_eq!(config.export.batch_size, 4);
        assert!(config.export.dynamic);
        assert!(!config.simplify);
        assert_eq!(config.quantize, Some(QuantType::QUInt8));
        assert_eq!(config.evaluate.device, ExecutionProvider::Cpu);
        assert_eq!(config.evaluate.fallback, FallbackPolicy::Fail);
        assert_eq!(config.benchmark.runs, 5);
        assert_eq!(config.benchmark.providers.len(), 2);
        assert_eq!(config.benchmark.fallback, FallbackPolicy::UseCpu);
        assert_eq!(config.save_dir, Some(PathBuf::from("out")));
        assert_eq!(config.chart_path, Some(PathBuf::from("out/chart.svg")));
        assert_eq!(config.report_path, Some(PathBuf::from("out/bench.json")));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::from_json(r#"{"model_path": "model.onnx"}"#).unwrap();

        assert_eq!(config.seed, default_seed());
        assert_eq!(config.dataset, DatasetConfig::default());
        assert_eq!(config.model_definition_path, None);
        assert_eq!(config.export, default_export());
        assert!(config.export.dynamic);
        assert_eq!(config.export.batch_size, 1);
        assert!(config.simplify);
        assert_eq!(config.quantize, None);
        assert_eq!(config.evaluate, EvaluateOptions::default());
        assert_eq!(config.benchmark, default_benchmark());
        assert_eq!(config.benchmark.providers, vec![ExecutionProvider::Cpu]);
        assert_eq!(config.benchmark.fallback, FallbackPolicy::Fail);
        assert_eq!(config.save_dir, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_required_fields() {
        let result = PipelineConfig::from_json(r#"{"seed": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_types() {
        let invalid_json = r#"{
            "model_path": "model.onnx",
            "simplify": "yes"
        }"#;
        let result = PipelineConfig::from_json(invalid_json);
        assert!(result.is_err());

        let unknown_provider = r#"{
            "model_path": "model.onnx",
            "evaluate": {"device": "tpu"}
        }"#;
        assert!(PipelineConfig::from_json(unknown_provider).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"model_path": "m.onnx", "seed": 3}"#).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.seed, 3);
    }
}
