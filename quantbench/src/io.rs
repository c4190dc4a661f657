// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

pub mod model_loader;
pub mod publish;

pub use model_loader::*;
pub use publish::*;
