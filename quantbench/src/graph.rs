// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

pub mod proto;
pub mod quantize;
pub mod simplify;

pub use quantize::*;
pub use simplify::*;
