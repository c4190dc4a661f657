// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

pub mod export;
pub mod sequential;

pub use export::*;
pub use sequential::*;

/// Per-sample input shape of every classifier handled here: CHW, 32x32 RGB.
pub const INPUT_SHAPE: [usize; 3] = [3, 32, 32];
