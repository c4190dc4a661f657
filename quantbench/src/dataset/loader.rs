// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

use crate::dataset::cifar10::{TestSet, IMAGE_SIZE};
use crate::determinism::Determinism;
use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tract_onnx::prelude::tract_ndarray::Array4;
use tract_onnx::prelude::*;

/// A batch of images `[n, 3, 32, 32]` with one label per image.
#[derive(Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Vec<usize>,
}

/// Seeded partition of `0..len`: the first `len - calibration_size` shuffled
/// indices are for evaluation, the last `calibration_size` for calibration.
pub fn split_indices(
    len: usize,
    calibration_size: usize,
    determinism: &Determinism,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if calibration_size > len {
        return Err(Error::InvalidInput(format!(
            "calibration size {} exceeds dataset size {}",
            calibration_size, len
        )));
    }
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut determinism.rng());
    let calibration = indices.split_off(len - calibration_size);
    Ok((indices, calibration))
}

fn gather(set: &TestSet, indices: &[usize]) -> Tensor {
    Array4::from_shape_fn((indices.len(), 3, 32, 32), |(n, c, h, w)| {
        set.image(indices[n])[c * 1024 + h * 32 + w]
    })
    .into_tensor()
}

/// Sequential, unshuffled batches over a subset of the test set.
///
/// Cloning is cheap and yields a loader at the same position.
#[derive(Clone)]
pub struct EvalLoader {
    set: Arc<TestSet>,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl EvalLoader {
    pub fn new(set: Arc<TestSet>, indices: Vec<usize>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be at least 1".into()));
        }
        Ok(EvalLoader {
            set,
            indices,
            batch_size,
            cursor: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Samples in the subset, consumed or not.
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }
}

impl Iterator for EvalLoader {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.cursor..end];
        self.cursor = end;
        Some(Batch {
            images: gather(&self.set, chunk),
            labels: chunk.iter().map(|i| self.set.label(*i)).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.indices.len() - self.cursor).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for EvalLoader {}

/// The calibration subset, kept whole.
#[derive(Clone)]
pub struct CalibrationSet {
    set: Arc<TestSet>,
    indices: Vec<usize>,
}

impl CalibrationSet {
    pub fn new(set: Arc<TestSet>, indices: Vec<usize>) -> Self {
        CalibrationSet { set, indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn images(&self) -> Tensor {
        gather(&self.set, &self.indices)
    }

    pub fn labels(&self) -> Vec<usize> {
        self.indices.iter().map(|i| self.set.label(*i)).collect()
    }
}
