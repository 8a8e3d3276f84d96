// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model Context Protocol (MCP) tool-server client
//!
//! Starts the servers listed in the tool-server file and exposes their tools
//! to the agent.

pub mod client;
pub mod protocol;
pub mod source;

pub use client::McpClient;
pub use source::{McpTool, McpToolSource};
