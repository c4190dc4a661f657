// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Top-1 accuracy of an artifact over a labelled, batched dataset.

use crate::dataset::Batch;
use crate::error::{Error, Result};
use crate::inference::{resolve_provider, ExecutionProvider, FallbackPolicy, SessionFactory};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tract_onnx::prelude::tract_ndarray::{ArrayView2, Ix2};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluateOptions {
    /// Preferred provider.
    pub device: ExecutionProvider,
    /// Applied when `device` is not available.
    pub fallback: FallbackPolicy,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        EvaluateOptions {
            device: ExecutionProvider::Accelerator,
            fallback: FallbackPolicy::UseCpu,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Provider the evaluation actually ran on.
    pub provider: ExecutionProvider,
    pub correct: usize,
    pub batches: usize,
    /// Size of the first batch.
    pub batch_size: usize,
    /// `100 * correct / (batches * batch_size)`.
    pub accuracy: f64,
}

/// Index of the highest score in every row; ties resolve to the lowest index.
pub fn argmax_rows(scores: ArrayView2<f32>) -> Vec<usize> {
    scores
        .outer_iter()
        .map(|row| {
            let mut best = 0;
            for (i, value) in row.iter().enumerate() {
                if *value > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Runs the artifact over every batch once, in order, and reports top-1 accuracy.
///
/// The percentage divides by `batches * first_batch_size`, so a short final
/// batch makes it a slight underestimate rather than an exact per-sample mean.
///
/// # Arguments
/// * `factory` - Creates the session for the resolved provider.
/// * `model_path` - ONNX artifact to evaluate.
/// * `data` - Batches of images `[N, 3, 32, 32]` with their labels.
/// * `options` - Preferred provider and fallback policy.
pub fn evaluate_accuracy<I>(
    factory: &dyn SessionFactory,
    model_path: &Path,
    data: I,
    options: &EvaluateOptions,
) -> Result<AccuracyReport>
where
    I: IntoIterator<Item = Batch>,
{
    let provider = resolve_provider(factory, options.device, options.fallback)?;
    info!("Accuracy :: model {} on {}", model_path.display(), provider);
    let mut session = factory.create(model_path, provider)?;

    let data = data.into_iter();
    let progress = ProgressBar::new(data.size_hint().0 as u64);
    let mut correct = 0;
    let mut batches = 0;
    let mut batch_size = 0;

    for batch in data {
        if batches == 0 {
            batch_size = batch.labels.len();
        }
        let scores = session.run(batch.images)?;
        let scores = scores.to_array_view::<f32>()?.into_dimensionality::<Ix2>()?;
        let predictions = argmax_rows(scores);
        if predictions.len() != batch.labels.len() {
            return Err(Error::InvalidInput(format!(
                "model returned {} rows for {} labels",
                predictions.len(),
                batch.labels.len()
            )));
        }
        correct += predictions
            .iter()
            .zip(batch.labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        batches += 1;
        progress.inc(1);
    }
    progress.finish_and_clear();

    if batches == 0 || batch_size == 0 {
        return Err(Error::EmptyDataset);
    }
    let accuracy = 100.0 * correct as f64 / (batches * batch_size) as f64;
    info!(
        "Accuracy :: top-1 acc = {} with {} correct samples",
        accuracy, correct
    );
    Ok(AccuracyReport {
        provider,
        correct,
        batches,
        batch_size,
        accuracy,
    })
}
