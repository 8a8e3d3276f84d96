// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Parley
//!
//! Handles loading settings from ~/.parley/settings.json. The
//! struct is built once at startup, layered with environment overrides, and
//! then passed by reference into every component.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::tools::ToolPolicy;

mod env;
mod io;
pub mod schema;
mod validation;

/// Main settings structure, stored in ~/.parley/settings.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Active model identifier (`provider/name` or a bare local model name)
    #[serde(default = "default_model")]
    pub model: String,

    /// LLM provider configurations
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Context budget settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Display truncation limits for tool activity
    #[serde(default)]
    pub display: DisplayConfig,

    /// Thread listing and storage settings
    #[serde(default)]
    pub threads: ThreadsConfig,

    /// Tool approval and tool-server settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Log filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            providers: ProvidersConfig::default(),
            context: ContextConfig::default(),
            display: DisplayConfig::default(),
            threads: ThreadsConfig::default(),
            tools: ToolsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Local Ollama runtime
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI API
    #[serde(default = "CloudProviderConfig::openai")]
    pub openai: CloudProviderConfig,

    /// DeepSeek API (OpenAI-compatible)
    #[serde(default = "CloudProviderConfig::deepseek")]
    pub deepseek: CloudProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            openai: CloudProviderConfig::openai(),
            deepseek: CloudProviderConfig::deepseek(),
        }
    }
}

/// Local Ollama runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
        }
    }
}

/// Cloud provider configuration (API key + endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudProviderConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    pub api_key_env: String,

    /// Base URL for API
    pub base_url: String,
}

impl CloudProviderConfig {
    pub fn openai() -> Self {
        Self {
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn deepseek() -> Self {
        Self {
            api_key: None,
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
        }
    }
}

/// Context budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token ceiling for the in-memory history
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Usage percentage at which the warning band starts
    #[serde(default = "default_warning_pct")]
    pub warning_pct: u8,

    /// Usage percentage at which the danger band starts
    #[serde(default = "default_danger_pct")]
    pub danger_pct: u8,

    /// Estimated characters per token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Overhead tokens per message for role and framing
    #[serde(default = "default_message_overhead_tokens")]
    pub message_overhead_tokens: usize,

    /// Messages kept verbatim when older history is summarized; 0 summarizes everything
    #[serde(default = "default_keep_recent_messages")]
    pub keep_recent_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            warning_pct: default_warning_pct(),
            danger_pct: default_danger_pct(),
            chars_per_token: default_chars_per_token(),
            message_overhead_tokens: default_message_overhead_tokens(),
            keep_recent_messages: default_keep_recent_messages(),
        }
    }
}

/// Display truncation limits (presentation only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Maximum characters of tool input shown
    #[serde(default = "default_tool_input_limit")]
    pub tool_input_limit: usize,

    /// Maximum characters of tool output shown
    #[serde(default = "default_tool_output_limit")]
    pub tool_output_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tool_input_limit: default_tool_input_limit(),
            tool_output_limit: default_tool_output_limit(),
        }
    }
}

/// Thread listing and checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    /// Maximum number of threads shown in a listing
    #[serde(default = "default_thread_preview_limit")]
    pub preview_limit: usize,

    /// Maximum number of checkpoints scanned to build a listing
    #[serde(default = "default_thread_scan_limit")]
    pub scan_limit: usize,

    /// Checkpoint database path (defaults to ~/.parley/threads.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_thread_preview_limit(),
            scan_limit: default_thread_scan_limit(),
            database: None,
        }
    }
}

/// Tool approval and tool-server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Policy applied to tools without an explicit entry
    #[serde(default)]
    pub default_policy: ToolPolicy,

    /// Per-tool approval policy
    #[serde(default)]
    pub policies: HashMap<String, ToolPolicy>,

    /// JSON file describing MCP tool servers
    #[serde(default = "default_mcp_servers_file")]
    pub mcp_servers_file: PathBuf,

    /// Upper bound on model/tool round trips within a single turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_policy: ToolPolicy::default(),
            policies: HashMap::new(),
            mcp_servers_file: default_mcp_servers_file(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_model() -> String {
    "qwen3:14b".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_context_tokens() -> usize {
    9000
}

fn default_warning_pct() -> u8 {
    50
}

fn default_danger_pct() -> u8 {
    80
}

fn default_chars_per_token() -> usize {
    4
}

fn default_message_overhead_tokens() -> usize {
    4
}

fn default_keep_recent_messages() -> usize {
    6
}

fn default_tool_input_limit() -> usize {
    100
}

fn default_tool_output_limit() -> usize {
    200
}

fn default_thread_preview_limit() -> usize {
    80
}

fn default_thread_scan_limit() -> usize {
    1000
}

fn default_mcp_servers_file() -> PathBuf {
    PathBuf::from("mcp_servers.json")
}

fn default_max_tool_rounds() -> usize {
    25
}
