// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-server configuration file
//!
//! A JSON object mapping server names to launch descriptions:
//!
//! ```json
//! {
//!   "filesystem": { "command": "npx", "args": ["-y", "@mcp/fs", "."] }
//! }
//! ```
//!
//! The same map nested under an `mcpServers` key is accepted as well.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{ParleyError, Result};

/// How a single tool server is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Executable to spawn
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Transport name; only `stdio` is supported
    #[serde(default = "default_transport")]
    pub transport: String,
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            transport: default_transport(),
        }
    }

    pub fn is_stdio(&self) -> bool {
        self.transport.eq_ignore_ascii_case("stdio")
    }
}

fn default_transport() -> String {
    "stdio".to_string()
}

/// All configured tool servers, ordered by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpServers {
    pub servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawServers {
    Wrapped {
        #[serde(rename = "mcpServers")]
        mcp_servers: BTreeMap<String, McpServerConfig>,
    },
    Flat(BTreeMap<String, McpServerConfig>),
}

impl McpServers {
    /// Load the server map. A missing file means no servers.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(
                target: "parley.config",
                path = %path.display(),
                "no tool-server file, starting without servers"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| {
            ParleyError::Config(format!("Invalid tool-server file {}: {}", path.display(), e))
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_json::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let servers = match serde_json::from_str::<RawServers>(content)? {
            RawServers::Wrapped { mcp_servers } => mcp_servers,
            RawServers::Flat(servers) => servers,
        };
        Ok(Self { servers })
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
        self.servers.iter()
    }
}
