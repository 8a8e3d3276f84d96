// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::PathBuf;

use super::Settings;

impl Settings {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// Unparseable numeric values are ignored with a warning so a typo in the
    /// environment never prevents startup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("MODEL_NAME") {
            self.model = model;
        }
        if let Some(raw) = non_empty("MAX_CONTEXT_TOKENS") {
            match raw.trim().parse::<usize>() {
                Ok(tokens) => self.context.max_context_tokens = tokens,
                Err(_) => tracing::warn!(
                    target: "parley.config",
                    value = %raw,
                    "ignoring MAX_CONTEXT_TOKENS: not a positive integer"
                ),
            }
        }
        if let Some(path) = non_empty("MCP_SERVERS_FILE") {
            self.tools.mcp_servers_file = PathBuf::from(path);
        }
        if let Some(level) = non_empty("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(host) = non_empty("OLLAMA_HOST") {
            self.providers.ollama.base_url = normalize_ollama_host(&host);
        }
        if let Some(db) = non_empty("PARLEY_DATABASE") {
            self.threads.database = Some(PathBuf::from(db));
        }
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(lookup(&[
            ("MODEL_NAME", "openai/gpt-4o"),
            ("MAX_CONTEXT_TOKENS", "16000"),
            ("MCP_SERVERS_FILE", "/etc/parley/mcp.json"),
            ("LOG_LEVEL", "DEBUG"),
        ]));

        assert_eq!(settings.model, "openai/gpt-4o");
        assert_eq!(settings.context.max_context_tokens, 16000);
        assert_eq!(
            settings.tools.mcp_servers_file,
            PathBuf::from("/etc/parley/mcp.json")
        );
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_invalid_number_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(lookup(&[("MAX_CONTEXT_TOKENS", "lots")]));
        assert_eq!(settings.context.max_context_tokens, 9000);
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(lookup(&[("MODEL_NAME", "  ")]));
        assert_eq!(settings.model, "qwen3:14b");
    }

    #[test]
    fn test_ollama_host_normalized() {
        assert_eq!(normalize_ollama_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_ollama_host("https://gpu.box/"), "https://gpu.box");
    }
}
