// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! End-to-end run driven by a `PipelineConfig`.

use crate::config::PipelineConfig;
use crate::dataset::prepare_test_data;
use crate::determinism::Determinism;
use crate::error::{Error, Result};
use crate::graph::{proto, quantize_model, simplify_model, QuantizeOptions, SimplifyOptions};
use crate::inference::{
    benchmark, evaluate_accuracy, AccuracyReport, BenchmarkReport, SessionFactory,
};
use crate::model::{export_model, ExportOptions, Sequential};
use crate::report::{model_info, BarChart, BarSeries, ModelInfo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything measured for one artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantReport {
    pub model_path: PathBuf,
    pub size_bytes: u64,
    pub info: ModelInfo,
    pub accuracy: AccuracyReport,
    pub benchmarks: Vec<BenchmarkReport>,
}

/// Produces the artifacts the config asks for, in order: export, simplify, quantize.
fn produce_variants(config: &PipelineConfig, determinism: &Determinism) -> Result<Vec<PathBuf>> {
    if let Some(definition) = &config.model_definition_path {
        let model = Sequential::load(definition)?;
        let options = ExportOptions {
            save_to: config.save_dir.clone(),
            ..config.export.clone()
        };
        export_model(&model, &config.model_path, &options, determinism)?;
    }

    let mut variants = vec![config.model_path.clone()];
    if config.simplify {
        let options = SimplifyOptions {
            save_to: config.save_dir.clone(),
            ..Default::default()
        };
        variants.push(simplify_model(&config.model_path, &options, determinism)?);
    }
    if let Some(quant_type) = config.quantize {
        let options = QuantizeOptions {
            quant_type,
            save_to: config.save_dir.clone(),
        };
        let source = variants.last().unwrap_or(&config.model_path).clone();
        variants.push(quantize_model(&source, &options)?);
    }
    Ok(variants)
}

/// Rejects artifacts whose fixed batch size differs from the evaluation or
/// benchmark batch size, before any data is downloaded.
fn check_batch_sizes(config: &PipelineConfig, variants: &[PathBuf]) -> Result<()> {
    for path in variants {
        let (input_name, dims) = proto::primary_input(&proto::load_model(path)?)?;
        let fixed = match dims.first() {
            Some(Some(batch)) => *batch,
            _ => continue,
        };
        for (use_case, batch_size) in [
            ("evaluation", config.dataset.batch_size),
            ("benchmark", config.benchmark.batch_size),
        ] {
            if batch_size != fixed {
                return Err(Error::InvalidInput(format!(
                    "{}: input '{}' has a fixed batch size of {}, {} batch size is {}",
                    path.display(),
                    input_name,
                    fixed,
                    use_case,
                    batch_size
                )));
            }
        }
    }
    Ok(())
}

fn variant_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Accuracy next to file size, one group per variant.
pub fn comparison_chart(reports: &[VariantReport]) -> BarChart {
    let accuracy = reports.iter().map(|r| r.accuracy.accuracy).collect();
    let size_mb = reports
        .iter()
        .map(|r| (r.size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0)
        .collect();
    BarChart {
        categories: reports.iter().map(|r| variant_name(&r.model_path)).collect(),
        series: BarSeries::Grouped {
            values: vec![accuracy, size_mb],
            legend: vec!["accuracy (%)".to_string(), "size (MB)".to_string()],
        },
        x_label: "model".to_string(),
        y_label: "value".to_string(),
        title: "Accuracy and size per model".to_string(),
    }
}

/// Runs the whole pipeline and returns one report per produced artifact.
///
/// 1. Export the model definition, if any, to `model_path`.
/// 2. Simplify and quantize as configured; quantization starts from the
///    newest artifact.
/// 3. Check fixed batch sizes, then prepare the CIFAR-10 test split once.
/// 4. Inspect, evaluate and benchmark every artifact.
/// 5. Write the JSON report and the comparison chart when paths are given.
pub fn run(config: &PipelineConfig, factory: &dyn SessionFactory) -> Result<Vec<VariantReport>> {
    let determinism = Determinism::new(config.seed);
    let variants = produce_variants(config, &determinism)?;
    check_batch_sizes(config, &variants)?;
    let data = prepare_test_data(&config.dataset, &determinism)?;

    let mut reports = Vec::with_capacity(variants.len());
    for path in variants {
        info!("Pipeline :: Model - {}", path.display());
        let info = model_info(&path)?;
        let size_bytes = std::fs::metadata(&path)?.len();
        let accuracy = evaluate_accuracy(factory, &path, data.eval.clone(), &config.evaluate)?;
        let benchmarks = benchmark(factory, &path, &config.benchmark)?;
        reports.push(VariantReport {
            model_path: path,
            size_bytes,
            info,
            accuracy,
            benchmarks,
        });
    }

    if let Some(report_path) = &config.report_path {
        std::fs::write(report_path, serde_json::to_string_pretty(&reports)?)?;
        info!("Pipeline :: wrote report to {}", report_path.display());
    }
    if let Some(chart_path) = &config.chart_path {
        comparison_chart(&reports).save(chart_path)?;
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetConfig;
    use crate::dataset::{BATCH_DIR, IMAGE_SIZE, RECORD_SIZE, TEST_BATCH_FILE};
    use crate::graph::QuantType;
    use crate::inference::{
        BenchmarkOptions, EvaluateOptions, ExecutionProvider, FallbackPolicy, TractSessionFactory,
    };
    use crate::model::sequential::tests::small_mlp;

    fn seeded_cache(dir: &Path, records: usize) {
        let batch_dir = dir.join(BATCH_DIR);
        std::fs::create_dir_all(&batch_dir).unwrap();
        let mut bytes = Vec::with_capacity(records * RECORD_SIZE);
        for i in 0..records {
            bytes.push((i % 10) as u8);
            bytes.extend((0..IMAGE_SIZE).map(|p| ((i * 7 + p) % 256) as u8));
        }
        std::fs::write(batch_dir.join(TEST_BATCH_FILE), bytes).unwrap();
    }

    fn config(dir: &Path) -> PipelineConfig {
        let definition = dir.join("mlp.json");
        let model = small_mlp(&Determinism::default());
        std::fs::write(&definition, model.to_json().unwrap()).unwrap();
        seeded_cache(&dir.join("data"), 30);

        PipelineConfig {
            seed: 42,
            dataset: DatasetConfig {
                data_dir: dir.join("data"),
                calibration_size: 10,
                batch_size: 8,
                num_workers: 2,
            },
            model_path: dir.join("mlp.onnx"),
            model_definition_path: Some(definition),
            export: ExportOptions {
                dynamic: true,
                ..Default::default()
            },
            simplify: true,
            quantize: Some(QuantType::QInt8),
            evaluate: EvaluateOptions::default(),
            benchmark: BenchmarkOptions {
                batch_size: 2,
                runs: 2,
                providers: vec![ExecutionProvider::Cpu],
                fallback: FallbackPolicy::Fail,
            },
            save_dir: Some(dir.join("published")),
            chart_path: Some(dir.join("chart.svg")),
            report_path: Some(dir.join("report.json")),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let reports = run(&config, &TractSessionFactory).unwrap();

        let names: Vec<String> = reports.iter().map(|r| variant_name(&r.model_path)).collect();
        assert_eq!(names, vec!["mlp", "mlp_sim", "mlp_sim_quant"]);
        for report in &reports {
            // 20 evaluation samples in batches of 8.
            assert_eq!(report.accuracy.batches, 3);
            assert_eq!(report.accuracy.batch_size, 8);
            assert_eq!(report.accuracy.provider, ExecutionProvider::Cpu);
            assert_eq!(report.benchmarks.len(), 1);
        }
        let float_params = 3072 * 16 + 16 + 16 * 10 + 10;
        assert_eq!(reports[0].info.params, float_params);
        assert_eq!(reports[1].info.params, float_params);
        // Each quantized weight adds a scale and a zero point.
        assert_eq!(reports[2].info.params, float_params + 4);
        assert_eq!(reports[0].accuracy.correct, reports[1].accuracy.correct);
        assert!(reports[2].size_bytes < reports[1].size_bytes);

        for published in ["mlp.onnx", "mlp_sim.onnx", "mlp_sim_quant.onnx"] {
            assert!(dir.path().join("published").join(published).is_file());
        }
        let written: Vec<VariantReport> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap())
                .unwrap();
        assert_eq!(written.len(), 3);
        let svg = std::fs::read_to_string(dir.path().join("chart.svg")).unwrap();
        assert!(svg.contains(">mlp_sim_quant</text>"));
    }

    #[test]
    fn test_existing_artifact_without_extras() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        export_model(
            &small_mlp(&Determinism::default()),
            &config.model_path,
            &ExportOptions::default(),
            &Determinism::default(),
        )
        .unwrap();
        config.model_definition_path = None;
        config.simplify = false;
        config.quantize = None;
        config.save_dir = None;
        config.chart_path = None;
        config.report_path = None;
        config.benchmark.batch_size = 1;
        // The fixed-batch artifact only accepts batches of one.
        config.dataset.batch_size = 1;

        let reports = run(&config, &TractSessionFactory).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].accuracy.batches, 20);
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn test_minimal_config_runs_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let definition = dir.path().join("mlp.json");
        std::fs::write(&definition, small_mlp(&Determinism::default()).to_json().unwrap()).unwrap();
        seeded_cache(&dir.path().join("data"), 150);
        let json = serde_json::json!({
            "model_path": dir.path().join("mlp.onnx"),
            "model_definition_path": definition,
            "dataset": {"data_dir": dir.path().join("data")},
        });
        let config = PipelineConfig::from_json(&json.to_string()).unwrap();

        let reports = run(&config, &TractSessionFactory).unwrap();
        assert_eq!(reports.len(), 2);
        for report in &reports {
            // 150 records minus 100 calibration samples, one short batch.
            assert_eq!(report.accuracy.batches, 1);
            assert_eq!(report.accuracy.batch_size, 50);
            assert_eq!(report.benchmarks[0].batch_size, 100);
        }
    }

    #[test]
    fn test_fixed_batch_mismatch_fails_before_data_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.export = ExportOptions::default();
        config.quantize = None;
        // No cached batch here, so reaching the dataset step would need the network.
        config.dataset.data_dir = dir.path().join("empty");

        let result = run(&config, &TractSessionFactory);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!dir.path().join("empty").exists());
    }

    #[test]
    fn test_save_dir_next_to_artifacts_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.save_dir = Some(dir.path().to_path_buf());

        let reports = run(&config, &TractSessionFactory).unwrap();
        for report in &reports {
            assert!(std::fs::metadata(&report.model_path).unwrap().len() > 0);
            assert!(report.info.params > 0);
        }
    }

    #[test]
    fn test_chart_groups_accuracy_and_size() {
        let report = |name: &str, accuracy: f64, size_bytes: u64| VariantReport {
            model_path: PathBuf::from(format!("/m/{}.onnx", name)),
            size_bytes,
            info: ModelInfo {
                params: 1,
                model_size: String::new(),
            },
            accuracy: AccuracyReport {
                provider: ExecutionProvider::Cpu,
                correct: 0,
                batches: 1,
                batch_size: 1,
                accuracy,
            },
            benchmarks: vec![],
        };
        let chart = comparison_chart(&[report("a", 90.0, 2 * 1024 * 1024), report("b", 80.5, 524288)]);
        assert_eq!(chart.categories, vec!["a", "b"]);
        match chart.series {
            BarSeries::Grouped { values, legend } => {
                assert_eq!(values, vec![vec![90.0, 80.5], vec![2.0, 0.5]]);
                assert_eq!(legend.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
