// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! CIFAR-10 binary test batch: fetching, extraction and record decoding.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
pub const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
pub const BATCH_DIR: &str = "cifar-10-batches-bin";
pub const TEST_BATCH_FILE: &str = "test_batch.bin";

pub const IMAGE_SIZE: usize = 3 * 32 * 32;
/// One label byte followed by the channel-planar image.
pub const RECORD_SIZE: usize = 1 + IMAGE_SIZE;
const PLANE_SIZE: usize = 32 * 32;

/// Per-channel normalization constants.
pub const MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
pub const STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Normalized test images, stored flat in `[N, 3, 32, 32]` order.
#[derive(Clone, Debug, PartialEq)]
pub struct TestSet {
    pixels: Vec<f32>,
    labels: Vec<usize>,
}

impl TestSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    /// Normalized pixels of one image, `3 * 32 * 32` values.
    pub fn image(&self, index: usize) -> &[f32] {
        &self.pixels[index * IMAGE_SIZE..(index + 1) * IMAGE_SIZE]
    }
}

/// `x / 255`, then standardized with the channel's mean and std.
pub fn normalize(byte: u8, channel: usize) -> f32 {
    (byte as f32 / 255.0 - MEAN[channel]) / STD[channel]
}

/// Returns the path of `test_batch.bin` under `data_dir`, downloading and
/// extracting the archive first when it is missing.
pub async fn ensure_test_batch(data_dir: &Path) -> Result<PathBuf> {
    let batch_path = data_dir.join(BATCH_DIR).join(TEST_BATCH_FILE);
    if batch_path.is_file() {
        debug!("Dataset :: using cached {}", batch_path.display());
        return Ok(batch_path);
    }

    tokio::fs::create_dir_all(data_dir).await?;
    let archive_path = data_dir.join(ARCHIVE_NAME);
    if archive_path.is_file() {
        info!("Dataset :: archive already exists, skipping download");
    } else {
        download(CIFAR10_URL, &archive_path).await?;
    }
    let (archive, output_dir) = (archive_path.clone(), data_dir.to_path_buf());
    tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &output_dir)).await??;

    if !batch_path.is_file() {
        return Err(Error::Dataset(format!(
            "{} did not contain {}/{}",
            archive_path.display(),
            BATCH_DIR,
            TEST_BATCH_FILE
        )));
    }
    Ok(batch_path)
}

async fn download(url: &str, destination: &Path) -> Result<()> {
    info!("Dataset :: downloading {}", url);
    let response = reqwest::get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;
    // Written under a temporary name so an interrupted download is not mistaken for the archive.
    let partial = destination.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, destination).await?;
    info!(
        "Dataset :: downloaded {} bytes to {}",
        bytes.len(),
        destination.display()
    );
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    info!("Dataset :: extracting {}", archive_path.display());
    let decompressor = GzDecoder::new(File::open(archive_path)?);
    tar::Archive::new(decompressor).unpack(output_dir)?;
    Ok(())
}

fn decode_chunk(bytes: &[u8]) -> Result<(Vec<f32>, Vec<usize>)> {
    let records = bytes.len() / RECORD_SIZE;
    let mut pixels = Vec::with_capacity(records * IMAGE_SIZE);
    let mut labels = Vec::with_capacity(records);
    for record in bytes.chunks_exact(RECORD_SIZE) {
        let label = record[0] as usize;
        if label >= CLASS_NAMES.len() {
            return Err(Error::Dataset(format!("label {} out of range", label)));
        }
        labels.push(label);
        for (i, byte) in record[1..].iter().enumerate() {
            pixels.push(normalize(*byte, i / PLANE_SIZE));
        }
    }
    Ok((pixels, labels))
}

/// Decodes binary records on the runtime's blocking pool, split into
/// `workers` contiguous chunks that are joined back in order.
pub async fn decode_records(bytes: Arc<Vec<u8>>, workers: usize) -> Result<TestSet> {
    if bytes.is_empty() || bytes.len() % RECORD_SIZE != 0 {
        return Err(Error::Dataset(format!(
            "batch length {} is not a positive multiple of {}",
            bytes.len(),
            RECORD_SIZE
        )));
    }
    let records = bytes.len() / RECORD_SIZE;
    let per_chunk = records.div_ceil(workers.max(1));

    let mut handles = Vec::new();
    for start in (0..records).step_by(per_chunk) {
        let end = (start + per_chunk).min(records);
        let bytes = bytes.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            decode_chunk(&bytes[start * RECORD_SIZE..end * RECORD_SIZE])
        }));
    }

    let mut pixels = Vec::with_capacity(records * IMAGE_SIZE);
    let mut labels = Vec::with_capacity(records);
    for handle in handles {
        let (chunk_pixels, chunk_labels) = handle.await??;
        pixels.extend(chunk_pixels);
        labels.extend(chunk_labels);
    }
    debug!("Dataset :: decoded {} records", labels.len());
    Ok(TestSet { pixels, labels })
}
