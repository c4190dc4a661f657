// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Explicit source of reproducible randomness.
//!
//! Operations that draw random numbers (dataset partitioning, export probe
//! inputs, simplifier equivalence checks) take a `&Determinism` and derive a
//! freshly seeded generator from it, so each of them starts from the same
//! state on every call and in every process.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Determinism {
    seed: u64,
}

impl Default for Determinism {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Determinism {
    pub fn new(seed: u64) -> Self {
        Determinism { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a generator seeded from scratch. Two calls yield identical streams.
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    /// Standard-normal `f32` tensor of the given shape, drawn from a fresh generator.
    pub fn randn(&self, shape: &[usize]) -> Tensor {
        let mut rng = self.rng();
        tract_ndarray::ArrayD::from_shape_simple_fn(shape, || {
            let v: f32 = StandardNormal.sample(&mut rng);
            v
        })
        .into_tensor()
    }
}
