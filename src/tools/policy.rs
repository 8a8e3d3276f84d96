// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Approval policy for tools
//!
//! Decides, per call, whether a tool runs directly, is refused, or needs the
//! user's approval first. Explicit per-tool entries always win. Without one,
//! a tool that flags itself as approval-required is asked about even when the
//! default is `allow`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::config::Settings;

/// What happens when the model calls a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPolicy {
    /// Run without asking
    Allow,
    /// Refuse without asking
    Deny,
    /// Ask the user each time
    #[default]
    Ask,
}

/// Approval policy shared between the session and running turns
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    default: ToolPolicy,
    per_tool: HashMap<String, ToolPolicy>,
    /// Tools the user allowed for the rest of the session
    session_allowed: Arc<RwLock<HashSet<String>>>,
}

impl ApprovalPolicy {
    pub fn new(default: ToolPolicy) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default: settings.tools.default_policy,
            per_tool: settings.tools.policies.clone(),
            session_allowed: Arc::default(),
        }
    }

    /// Everything runs without asking
    pub fn trusting() -> Self {
        Self::new(ToolPolicy::Allow)
    }

    pub fn with_tool(mut self, name: impl Into<String>, policy: ToolPolicy) -> Self {
        self.per_tool.insert(name.into(), policy);
        self
    }

    /// Policy for one call of `tool_name`
    pub fn decide(&self, tool_name: &str, requires_approval: bool) -> ToolPolicy {
        if let Some(policy) = self.per_tool.get(tool_name) {
            return *policy;
        }
        if self.is_session_allowed(tool_name) {
            return ToolPolicy::Allow;
        }
        match self.default {
            ToolPolicy::Allow if requires_approval => ToolPolicy::Ask,
            other => other,
        }
    }

    /// Stop asking about `tool_name` until the session ends
    pub fn allow_for_session(&self, tool_name: &str) {
        match self.session_allowed.write() {
            Ok(mut allowed) => {
                allowed.insert(tool_name.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(tool_name.to_string());
            }
        }
        tracing::debug!(target: "parley.tools", tool = tool_name, "allowed for session");
    }

    pub fn is_session_allowed(&self, tool_name: &str) -> bool {
        match self.session_allowed.read() {
            Ok(allowed) => allowed.contains(tool_name),
            Err(poisoned) => poisoned.into_inner().contains(tool_name),
        }
    }

    pub fn default_policy(&self) -> ToolPolicy {
        self.default
    }
}
