// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! Execution providers, inference sessions and the fallback policy that
//! picks a provider for a run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::warn;

pub mod accuracy;
pub mod benchmark;
pub mod session;

pub use accuracy::*;
pub use benchmark::*;
pub use session::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionProvider {
    /// General-purpose processor.
    Cpu,
    /// Hardware accelerator (GPU or similar).
    Accelerator,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => write!(f, "cpu"),
            ExecutionProvider::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// What to do when the requested provider is not available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Run on the CPU provider instead.
    UseCpu,
    /// Fail with `Error::ProviderUnavailable`.
    Fail,
}

/// A loaded model that runs one batch at a time.
#[cfg_attr(test, mockall::automock)]
pub trait InferenceSession {
    fn provider(&self) -> ExecutionProvider;

    /// Runs the model on a single input tensor and returns its first output.
    fn run(&mut self, input: Tensor) -> Result<Tensor>;
}

/// Creates sessions for the providers it knows about.
#[cfg_attr(test, mockall::automock)]
pub trait SessionFactory {
    fn is_available(&self, provider: ExecutionProvider) -> bool;

    fn create(
        &self,
        model_path: &Path,
        provider: ExecutionProvider,
    ) -> Result<Box<dyn InferenceSession>>;
}

/// Applies `policy` to pick the provider a run will actually use.
pub fn resolve_provider(
    factory: &dyn SessionFactory,
    preferred: ExecutionProvider,
    policy: FallbackPolicy,
) -> Result<ExecutionProvider> {
    if factory.is_available(preferred) {
        return Ok(preferred);
    }
    match policy {
        FallbackPolicy::UseCpu => {
            warn!("Provider :: {} unavailable, falling back to cpu", preferred);
            Ok(ExecutionProvider::Cpu)
        }
        FallbackPolicy::Fail => Err(Error::ProviderUnavailable(preferred)),
    }
}
