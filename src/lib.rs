// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parley - an interactive agent session runner.
//!
//! This crate exposes the runtime used by the `parley` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `llm`: model identifiers, the provider registry and provider clients (Ollama, OpenAI-compatible)
//! - `context`: token budget estimation and history compaction
//! - `agent`: the per-turn event stream with tool approval
//! - `tools`, `mcp`: tool sets, approval policy, and MCP tool servers
//! - `threads`: persisted checkpoints and thread lifecycle
//! - `chat`: command resolution, the session state machine, and frontends
//! - `config`, `cli`: settings and command-line entry points

pub mod agent;
pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod threads;
pub mod tools;

pub use error::{ParleyError, Result};
