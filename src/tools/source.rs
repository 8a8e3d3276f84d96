// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Where tools come from
//!
//! The session only sees a [`ToolServerSource`]; calling `discover` again is
//! how tool servers are reloaded.

use async_trait::async_trait;

use super::ToolSet;
use crate::error::Result;

/// Discovers the tools currently offered by the configured servers
#[async_trait]
pub trait ToolServerSource: Send + Sync {
    async fn discover(&self) -> Result<ToolSet>;
}

/// A fixed set of tools
#[derive(Debug, Clone, Default)]
pub struct StaticToolSource {
    tools: ToolSet,
}

impl StaticToolSource {
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    /// A source that offers no tools
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolServerSource for StaticToolSource {
    async fn discover(&self) -> Result<ToolSet> {
        Ok(self.tools.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::EchoTool;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_source_returns_same_tools() {
        let source = StaticToolSource::new(ToolSet::new().with(Arc::new(EchoTool::new("echo"))));
        let first = source.discover().await.unwrap();
        let second = source.discover().await.unwrap();
        assert_eq!(first.names(), vec!["echo"]);
        assert_eq!(second.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_empty_source() {
        assert!(StaticToolSource::empty().discover().await.unwrap().is_empty());
    }
}
