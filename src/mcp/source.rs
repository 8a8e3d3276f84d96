// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-server discovery
//!
//! [`McpToolSource`] re-reads the server file on every `discover` call, starts
//! each configured server, and wraps every advertised tool as an [`McpTool`].
//! A server that fails to start is logged and skipped.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use super::client::McpClient;
use super::protocol::RemoteTool;
use crate::config::McpServers;
use crate::error::Result;
use crate::llm::provider::ToolDefinition;
use crate::tools::{Tool, ToolOutput, ToolServerSource, ToolSet};

/// A tool served by a remote MCP server
pub struct McpTool {
    client: Arc<McpClient>,
    remote: RemoteTool,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, remote: RemoteTool) -> Self {
        Self { client, remote }
    }

    pub fn server(&self) -> &str {
        self.client.name()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.remote.name.clone(),
            self.remote.description.clone(),
            self.remote.input_schema.clone(),
        )
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value) -> Result<ToolOutput> {
        let arguments = if input.is_null() {
            serde_json::json!({})
        } else {
            input
        };
        let result = self.client.call_tool(&self.remote.name, arguments).await?;
        Ok(ToolOutput {
            content: result.text(),
            is_error: result.is_error.unwrap_or(false),
        })
    }
}

/// Tools from the servers listed in a JSON file
#[derive(Debug, Clone)]
pub struct McpToolSource {
    path: PathBuf,
}

impl McpToolSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ToolServerSource for McpToolSource {
    async fn discover(&self) -> Result<ToolSet> {
        let servers = McpServers::load(&self.path)?;
        let mut tools = ToolSet::new();

        for (name, config) in servers.iter() {
            let client = match McpClient::connect(name, config).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!(target: "parley.mcp", server = %name, error = %e, "skipping tool server");
                    continue;
                }
            };
            let remote_tools = match client.list_tools().await {
                Ok(remote_tools) => remote_tools,
                Err(e) => {
                    tracing::warn!(target: "parley.mcp", server = %name, error = %e, "could not list tools");
                    continue;
                }
            };

            tracing::info!(target: "parley.mcp", server = %name, count = remote_tools.len(), "discovered tools");
            for remote in remote_tools {
                tools.insert(Arc::new(McpTool::new(client.clone(), remote)));
            }
        }

        Ok(tools)
    }
}
