// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

pub use super::{
    CloudProviderConfig, ContextConfig, DisplayConfig, OllamaConfig, ProvidersConfig, Settings,
    ThreadsConfig, ToolsConfig,
};
