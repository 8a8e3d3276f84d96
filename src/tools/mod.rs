// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system
//!
//! Tools are what the model can call during a turn. They come from tool
//! servers (see [`crate::mcp`]) or are supplied directly by the host through a
//! [`StaticToolSource`]. Whether a call may run without asking the user is
//! decided by the [`ApprovalPolicy`].

pub mod policy;
pub mod source;

pub use policy::{ApprovalPolicy, ToolPolicy};
pub use source::{StaticToolSource, ToolServerSource};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

/// Output from a tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful output
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error output
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait for implementing tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition for the LLM
    fn definition(&self) -> ToolDefinition;

    /// Whether this tool asks the user before running when no explicit policy exists
    fn requires_approval(&self) -> bool {
        false
    }

    /// Execute the tool with given input
    async fn call(&self, input: Value) -> Result<ToolOutput>;
}

/// Name-indexed collection of tools available to the model
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name
    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(target: "parley.tools", tool = %name, "duplicate tool name, keeping the last one");
        }
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.insert(tool);
        self
    }

    /// Move every tool of `other` into this set
    pub fn extend(&mut self, other: ToolSet) {
        for tool in other.tools.into_values() {
            self.insert(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions sent to the model, ordered by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::json;

    /// Echoes its `text` argument back
    pub struct EchoTool {
        pub name: String,
        pub gated: bool,
    }

    impl EchoTool {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                gated: false,
            }
        }

        pub fn gated(name: &str) -> Self {
            Self {
                name: name.to_string(),
                gated: true,
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(
                self.name.clone(),
                "Echo the text argument",
                json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            )
        }

        fn requires_approval(&self) -> bool {
            self.gated
        }

        async fn call(&self, input: Value) -> Result<ToolOutput> {
            match input.get("text").and_then(Value::as_str) {
                Some(text) => Ok(ToolOutput::success(text)),
                None => Ok(ToolOutput::error("missing 'text'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::EchoTool;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_set_indexes_by_name() {
        let set = ToolSet::new()
            .with(Arc::new(EchoTool::new("b_echo")))
            .with(Arc::new(EchoTool::new("a_echo")));

        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["a_echo", "b_echo"]);
        assert!(set.get("a_echo").is_some());
        assert!(set.get("missing").is_none());
        let defs = set.definitions();
        assert_eq!(defs[0].name, "a_echo");
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let mut set = ToolSet::new();
        set.insert(Arc::new(EchoTool::new("echo")));
        set.insert(Arc::new(EchoTool::gated("echo")));
        assert_eq!(set.len(), 1);
        assert!(set.get("echo").unwrap().requires_approval());
    }

    #[test]
    fn test_extend_merges() {
        let mut a = ToolSet::new().with(Arc::new(EchoTool::new("one")));
        a.extend(ToolSet::new().with(Arc::new(EchoTool::new("two"))));
        assert_eq!(a.names(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_echo_tool_call() {
        let tool = EchoTool::new("echo");
        assert_eq!(
            tool.call(json!({"text": "hi"})).await.unwrap(),
            ToolOutput::success("hi")
        );
        assert!(tool.call(json!({})).await.unwrap().is_error);
    }
}
