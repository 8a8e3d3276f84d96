// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model identifiers
//!
//! A model is named by a `provider/name` string. Bare names (no `/`) refer to
//! the local Ollama runtime so plain `MODEL_NAME` values keep working. Only the
//! text before the first `/` is ever considered as a provider tag, and only
//! when it is a known tag, so local names such as `hf.co/user/model:tag` stay
//! intact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParleyError;

const SEPARATOR: char = '/';

/// Backends that can answer chat requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local models served by Ollama
    #[default]
    Ollama,
    /// OpenAI API
    #[serde(rename = "openai")]
    OpenAi,
    /// DeepSeek API (OpenAI-compatible)
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Ollama,
        ProviderKind::OpenAi,
        ProviderKind::DeepSeek,
    ];

    /// Tag used in `provider/name` strings
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
        }
    }

    /// Whether models run on the local machine
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }

    /// Curated model list for cloud providers. Local models are discovered at runtime.
    pub fn catalogue(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Ollama => &[],
            ProviderKind::OpenAi => &["gpt-4o", "gpt-4o-mini", "o1", "o1-mini", "o3-mini"],
            ProviderKind::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(tag))
    }

    fn valid_tags() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.tag())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ProviderKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s.trim()).ok_or_else(|| {
            ParleyError::Config(format!(
                "Unknown provider '{}'. Valid providers: {}",
                s,
                Self::valid_tags()
            ))
        })
    }
}

/// Parsed `(provider, name)` pair identifying a model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub name: String,
}

impl ModelSpec {
    pub fn new(provider: ProviderKind, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }

    /// Parse a model string. Never fails: anything without a known provider
    /// prefix is a local model name.
    pub fn parse(model: &str) -> Self {
        if let Some((prefix, rest)) = model.split_once(SEPARATOR) {
            if let Some(provider) = ProviderKind::from_tag(prefix) {
                return Self::new(provider, rest);
            }
        }
        Self::new(ProviderKind::default(), model)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.provider, SEPARATOR, self.name)
    }
}

impl FromStr for ModelSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
