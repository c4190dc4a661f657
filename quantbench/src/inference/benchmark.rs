// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

use crate::error::{Error, Result};
use crate::inference::{resolve_provider, ExecutionProvider, FallbackPolicy, SessionFactory};
use crate::model::INPUT_SHAPE;
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::info;

fn default_batch_size() -> usize {
    100
}

fn default_runs() -> usize {
    100
}

fn default_providers() -> Vec<ExecutionProvider> {
    vec![ExecutionProvider::Cpu, ExecutionProvider::Accelerator]
}

fn default_fallback() -> FallbackPolicy {
    FallbackPolicy::Fail
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timed runs per provider, after one untimed warm-up.
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Benchmarked in order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ExecutionProvider>,
    #[serde(default = "default_fallback")]
    pub fallback: FallbackPolicy,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        BenchmarkOptions {
            batch_size: default_batch_size(),
            runs: default_runs(),
            providers: default_providers(),
            fallback: default_fallback(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub model_path: PathBuf,
    /// Provider the runs actually used.
    pub provider: ExecutionProvider,
    pub batch_size: usize,
    pub runs: usize,
    /// Mean wall-clock time of one batch, in milliseconds.
    pub avg_batch_ms: f64,
    /// `avg_batch_ms / batch_size`.
    pub avg_sample_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Measures average batch latency of the artifact on every requested provider.
///
/// Each provider gets an all-zero `[batch_size, 3, 32, 32]` input, one
/// untimed warm-up run and then `runs` timed runs. Providers are resolved
/// through `options.fallback` one at a time, so with `FallbackPolicy::Fail`
/// the reports of earlier providers are already logged when a later one is
/// found unavailable.
///
/// # Arguments
/// * `factory` - Creates a session per resolved provider.
/// * `model_path` - ONNX artifact to benchmark.
/// * `options` - Batch size, run count, providers and fallback policy.
///
/// # Returns
/// One report per requested provider, in order.
pub fn benchmark(
    factory: &dyn SessionFactory,
    model_path: &Path,
    options: &BenchmarkOptions,
) -> Result<Vec<BenchmarkReport>> {
    if options.runs == 0 {
        return Err(Error::InvalidInput("runs must be at least 1".into()));
    }
    if options.batch_size == 0 {
        return Err(Error::InvalidInput("batch_size must be at least 1".into()));
    }
    let mut shape = vec![options.batch_size];
    shape.extend_from_slice(&INPUT_SHAPE);

    let mut reports = Vec::with_capacity(options.providers.len());
    for preferred in &options.providers {
        let provider = resolve_provider(factory, *preferred, options.fallback)?;
        let mut session = factory.create(model_path, provider)?;
        let input = Tensor::zero::<f32>(&shape)?;

        session.run(input.clone())?;

        let progress = ProgressBar::new(options.runs as u64);
        let mut total_ms = 0.0;
        for _ in 0..options.runs {
            let batch = input.clone();
            let start = Instant::now();
            session.run(batch)?;
            total_ms += start.elapsed().as_secs_f64() * 1000.0;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let avg_batch_ms = total_ms / options.runs as f64;
        let avg_sample_ms = avg_batch_ms / options.batch_size as f64;
        info!(
            "Benchmark :: {} Avg: {:.4} ms, per 1 img: {:.4} ms",
            provider, avg_batch_ms, avg_sample_ms
        );
        reports.push(BenchmarkReport {
            model_path: model_path.to_path_buf(),
            provider,
            batch_size: options.batch_size,
            runs: options.runs,
            avg_batch_ms,
            avg_sample_ms,
            timestamp: Utc::now(),
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{MockInferenceSession, MockSessionFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sleeping_factory(delay: Duration, calls: Arc<AtomicUsize>) -> MockSessionFactory {
        let mut factory = MockSessionFactory::new();
        factory
            .expect_is_available()
            .returning(|p| p == ExecutionProvider::Cpu);
        factory.expect_create().returning(move |_, provider| {
            let calls = calls.clone();
            let mut session = MockInferenceSession::new();
            session.expect_provider().return_const(provider);
            session.expect_run().returning(move |input| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(delay);
                Ok(input)
            });
            Ok(Box::new(session))
        });
        factory
    }

    fn cpu_options(runs: usize) -> BenchmarkOptions {
        BenchmarkOptions {
            batch_size: 4,
            runs,
            providers: vec![ExecutionProvider::Cpu],
            fallback: FallbackPolicy::Fail,
        }
    }

    #[test]
    fn test_default_options() {
        let options = BenchmarkOptions::default();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.runs, 100);
        assert_eq!(
            options.providers,
            vec![ExecutionProvider::Cpu, ExecutionProvider::Accelerator]
        );
        assert_eq!(options.fallback, FallbackPolicy::Fail);
    }

    #[test]
    fn test_warm_up_is_not_timed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(Duration::from_millis(0), calls.clone());
        let reports = benchmark(&factory, Path::new("m.onnx"), &cpu_options(5)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].runs, 5);
        assert_eq!(reports[0].batch_size, 4);
        assert_eq!(reports[0].model_path, PathBuf::from("m.onnx"));
    }

    #[test]
    fn test_average_is_stable_across_run_counts() {
        let delay = Duration::from_millis(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(delay, calls);
        let short = benchmark(&factory, Path::new("m.onnx"), &cpu_options(10)).unwrap();
        let long = benchmark(&factory, Path::new("m.onnx"), &cpu_options(1000)).unwrap();

        let (short, long) = (short[0].avg_batch_ms, long[0].avg_batch_ms);
        assert!(short >= 2.0 && long >= 2.0);
        assert!(
            (short - long).abs() <= 0.2 * long,
            "10 runs: {} ms, 1000 runs: {} ms",
            short,
            long
        );
    }

    #[test]
    fn test_per_sample_latency() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(Duration::from_millis(1), calls);
        let report = &benchmark(&factory, Path::new("m.onnx"), &cpu_options(3)).unwrap()[0];
        assert!((report.avg_sample_ms - report.avg_batch_ms / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_unavailable_accelerator_fails_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(Duration::from_millis(0), calls.clone());
        let options = BenchmarkOptions {
            batch_size: 2,
            runs: 2,
            ..Default::default()
        };
        let result = benchmark(&factory, Path::new("m.onnx"), &options);
        assert!(matches!(
            result,
            Err(Error::ProviderUnavailable(ExecutionProvider::Accelerator))
        ));
        // The cpu pass ran before the accelerator was rejected.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fallback_benchmarks_cpu_twice() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(Duration::from_millis(0), calls);
        let options = BenchmarkOptions {
            batch_size: 2,
            runs: 2,
            fallback: FallbackPolicy::UseCpu,
            ..Default::default()
        };
        let reports = benchmark(&factory, Path::new("m.onnx"), &options).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.provider == ExecutionProvider::Cpu));
    }

    #[test]
    fn test_invalid_options() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = sleeping_factory(Duration::from_millis(0), calls);
        let no_runs = benchmark(&factory, Path::new("m.onnx"), &cpu_options(0));
        assert!(matches!(no_runs, Err(Error::InvalidInput(_))));
        let no_batch = BenchmarkOptions {
            batch_size: 0,
            ..cpu_options(3)
        };
        let result = benchmark(&factory, Path::new("m.onnx"), &no_batch);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
