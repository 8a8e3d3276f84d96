// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module
//!
//! Model identifiers, the provider registry, and the provider clients that
//! stream chat completions.

pub mod message;
pub mod mock_provider;
pub mod model_spec;
pub mod provider;
pub mod providers;
pub mod registry;

pub use message::*;
pub use mock_provider::{MockProvider, MockReply, MockToolCall};
pub use model_spec::{ModelSpec, ProviderKind};
pub use provider::*;
pub use registry::{available_models, list_local_models, ChatModelHandle, ProviderRegistry};
