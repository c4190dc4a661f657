// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Copies an artifact into `dir` (created when missing) and returns the copy's path.
///
/// Publishing into the directory the artifact already lives in leaves it untouched.
pub fn publish(path: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("'{}' has no file name", path.display())))?;
    let source = fs::canonicalize(path)?;
    fs::create_dir_all(dir)?;
    let destination = dir.join(file_name);
    if fs::canonicalize(dir)?.join(file_name) == source {
        info!("Publish :: {} is already in {}", path.display(), dir.display());
        return Ok(destination);
    }
    fs::copy(path, &destination)?;
    info!("Publish :: {} -> {}", path.display(), destination.display());
    Ok(destination)
}
