// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

pub mod chart;
pub mod inspect;

pub use chart::*;
pub use inspect::*;
