// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ParleyError, Result};
use crate::llm::{ModelSpec, ProviderKind};

use super::{CloudProviderConfig, Settings};

impl Settings {
    /// Cloud provider section for `kind`, `None` for the local runtime.
    pub fn cloud_provider(&self, kind: ProviderKind) -> Option<&CloudProviderConfig> {
        match kind {
            ProviderKind::Ollama => None,
            ProviderKind::OpenAi => Some(&self.providers.openai),
            ProviderKind::DeepSeek => Some(&self.providers.deepseek),
        }
    }

    /// Get the API key for a cloud provider, checking env var first.
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        self.api_key_with(kind, |key| std::env::var(key).ok())
    }

    /// Same as [`Settings::api_key`] with an explicit environment lookup.
    pub fn api_key_with<F>(&self, kind: ProviderKind, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self.cloud_provider(kind)?;
        // Priority: env var > config file.
        lookup(&config.api_key_env)
            .or_else(|| config.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    /// Collect every configuration problem that would stop `spec` from running.
    pub fn validate_for(&self, spec: &ModelSpec) -> Vec<String> {
        self.validate_with(spec, |key| std::env::var(key).ok())
    }

    pub fn validate_with<F>(&self, spec: &ModelSpec, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();

        if spec.name.trim().is_empty() {
            errors.push(format!(
                "Model name is empty in '{}'. Use provider/name, e.g. openai/gpt-4o.",
                spec
            ));
        }

        if let Some(config) = self.cloud_provider(spec.provider) {
            if self.api_key_with(spec.provider, &lookup).is_none() {
                errors.push(format!(
                    "{} is not set. Export it or add providers.{}.api_key to {}.",
                    config.api_key_env,
                    spec.provider,
                    Self::default_path().display()
                ));
            }
        }

        if self.context.max_context_tokens == 0 {
            errors.push("context.max_context_tokens must be a positive integer.".to_string());
        }
        if self.context.chars_per_token == 0 {
            errors.push("context.chars_per_token must be a positive integer.".to_string());
        }
        if self.context.warning_pct >= self.context.danger_pct || self.context.danger_pct > 100 {
            errors.push(format!(
                "context thresholds must satisfy warning < danger <= 100 (got {}/{}).",
                self.context.warning_pct, self.context.danger_pct
            ));
        }
        if self.threads.preview_limit == 0 || self.threads.scan_limit == 0 {
            errors.push("threads.preview_limit and threads.scan_limit must be positive.".to_string());
        }

        errors
    }

    /// Validate for `spec`, folding every problem into one configuration error.
    pub fn ensure_valid_for(&self, spec: &ModelSpec) -> Result<()> {
        aggregate(self.validate_for(spec))
    }
}

pub(crate) fn aggregate(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let body = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ParleyError::Config(format!(
        "{} problem(s) found:\n{}",
        errors.len(),
        body
    )))
}
