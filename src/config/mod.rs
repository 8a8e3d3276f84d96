// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module for Parley
//!
//! Handles loading, saving, and validating user settings, plus the MCP
//! tool-server manifest.

pub mod mcp_servers;
pub mod settings;

pub use mcp_servers::{McpServerConfig, McpServers};
pub use settings::*;
