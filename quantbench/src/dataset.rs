// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! CIFAR-10 test set preparation: download, decode, normalize and split into
//! an evaluation loader plus a calibration subset.

use crate::config::DatasetConfig;
use crate::determinism::Determinism;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::info;

pub mod cifar10;
pub mod loader;

pub use cifar10::*;
pub use loader::*;

/// The two disjoint views over the test set.
pub struct PreparedData {
    pub eval: EvalLoader,
    pub calibration: CalibrationSet,
}

/// Downloads the CIFAR-10 test batch if needed and splits it.
///
/// Download, extraction and record decoding run on a dedicated tokio runtime
/// with `config.num_workers` worker threads and as many blocking threads for
/// extraction and decoding. The runtime is shut down before returning.
///
/// # Arguments
/// * `config` - Cache directory, subset sizes and worker count.
/// * `determinism` - Seeds the permutation behind the split.
///
/// # Returns
/// An evaluation loader over `len - calibration_size` samples and the
/// `calibration_size` remaining samples.
pub fn prepare_test_data(config: &DatasetConfig, determinism: &Determinism) -> Result<PreparedData> {
    info!("Dataset :: Preparing data in {}", config.data_dir.display());
    if config.num_workers == 0 {
        return Err(Error::InvalidInput("num_workers must be at least 1".into()));
    }

    let data_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.num_workers)
        .max_blocking_threads(config.num_workers)
        .thread_name("quantbench-data-worker")
        .enable_all()
        .build()?;

    let test_set = data_runtime.block_on(async {
        let batch_path = ensure_test_batch(&config.data_dir).await?;
        let bytes = tokio::fs::read(&batch_path).await?;
        decode_records(Arc::new(bytes), config.num_workers).await
    });
    data_runtime.shutdown_background();
    let test_set = Arc::new(test_set?);

    let (eval_indices, calibration_indices) =
        split_indices(test_set.len(), config.calibration_size, determinism)?;
    let eval = EvalLoader::new(test_set.clone(), eval_indices, config.batch_size)?;
    let calibration = CalibrationSet::new(test_set, calibration_indices);
    info!(
        "Dataset :: evaluation samples = {}, calibration samples = {}",
        eval.num_samples(),
        calibration.len()
    );
    Ok(PreparedData { eval, calibration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// Writes a fake `test_batch.bin` so no download is attempted.
    fn seeded_cache(dir: &Path, records: usize) {
        let batch_dir = dir.join(BATCH_DIR);
        std::fs::create_dir_all(&batch_dir).unwrap();
        let mut bytes = Vec::with_capacity(records * RECORD_SIZE);
        for i in 0..records {
            bytes.push((i % 10) as u8);
            bytes.extend(std::iter::repeat((i % 256) as u8).take(IMAGE_SIZE));
        }
        std::fs::write(batch_dir.join(TEST_BATCH_FILE), bytes).unwrap();
    }

    #[test]
    fn test_prepare_from_cached_batch() {
        let dir = tempfile::tempdir().unwrap();
        seeded_cache(dir.path(), 250);
        let config = DatasetConfig {
            data_dir: dir.path().to_path_buf(),
            calibration_size: 50,
            batch_size: 64,
            num_workers: 3,
        };
        let data = prepare_test_data(&config, &Determinism::default()).unwrap();
        assert_eq!(data.eval.num_samples(), 200);
        assert_eq!(data.calibration.len(), 50);
        assert_eq!(data.eval.len(), 4);

        let sizes: Vec<usize> = data.eval.map(|b| b.labels.len()).collect();
        assert_eq!(sizes, vec![64, 64, 64, 8]);
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatasetConfig {
            data_dir: dir.path().to_path_buf(),
            num_workers: 0,
            ..Default::default()
        };
        let result = prepare_test_data(&config, &Determinism::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_calibration_larger_than_dataset() {
        let dir = tempfile::tempdir().unwrap();
        seeded_cache(dir.path(), 20);
        let config = DatasetConfig {
            data_dir: dir.path().to_path_buf(),
            calibration_size: 21,
            ..Default::default()
        };
        let result = prepare_test_data(&config, &Determinism::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
