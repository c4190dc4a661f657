// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

use quantbench::{logging, pipeline, PipelineConfig, TractSessionFactory};
use std::env;
use tracing::info;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let config_path = args
        .get(1)
        .ok_or("CLI argument (1) pipeline configuration path is missing")?;
    let config = PipelineConfig::load(config_path)?;
    logging::init(&config.log_level)?;
    info!("Main :: Loaded pipeline configuration from {}", config_path);

    let reports = pipeline::run(&config, &TractSessionFactory)?;
    for report in &reports {
        info!(
            "Main :: Model - {} :: acc {:.2}% | params {} | size {}",
            report.model_path.display(),
            report.accuracy.accuracy,
            report.info.params,
            report.info.model_size
        );
        for bench in &report.benchmarks {
            info!(
                "Main ::    {} Avg: {:.4} ms, per 1 img: {:.4} ms",
                bench.provider, bench.avg_batch_ms, bench.avg_sample_ms
            );
        }
    }
    Ok(())
}
