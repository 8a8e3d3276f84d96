// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider registry
//!
//! Maps each [`ProviderKind`] to a constructor. Building a handle runs only
//! the constructor for the requested provider, so a provider without
//! credentials never blocks another one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::llm::model_spec::{ModelSpec, ProviderKind};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{OllamaProvider, OpenAiCompatProvider};

/// Constructor for one provider kind
pub type ProviderFactory =
    Arc<dyn Fn(&ModelSpec, &Settings) -> Result<Arc<dyn LlmProvider>> + Send + Sync>;

/// A ready-to-call model: the provider client plus the model it targets
#[derive(Clone)]
pub struct ChatModelHandle {
    pub spec: ModelSpec,
    pub provider: Arc<dyn LlmProvider>,
}

impl ChatModelHandle {
    pub fn new(spec: ModelSpec, provider: Arc<dyn LlmProvider>) -> Self {
        Self { spec, provider }
    }

    /// Model name as the provider expects it
    pub fn model_name(&self) -> &str {
        &self.spec.name
    }
}

impl fmt::Debug for ChatModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatModelHandle")
            .field("spec", &self.spec.to_string())
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Registry of provider constructors keyed by provider tag
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    /// Empty registry (no provider can be built)
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Ollama, OpenAI and DeepSeek constructors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderKind::Ollama, Arc::new(build_ollama));
        registry.register(ProviderKind::OpenAi, Arc::new(build_cloud));
        registry.register(ProviderKind::DeepSeek, Arc::new(build_cloud));
        registry
    }

    /// Add or replace the constructor for `kind`
    pub fn register(&mut self, kind: ProviderKind, factory: ProviderFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn is_registered(&self, kind: ProviderKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Construct a chat-model handle for `spec`
    pub fn build(&self, spec: &ModelSpec, settings: &Settings) -> Result<ChatModelHandle> {
        let factory = self.factories.get(&spec.provider).ok_or_else(|| {
            let mut known: Vec<_> = self.factories.keys().map(|k| k.tag()).collect();
            known.sort_unstable();
            ParleyError::Config(format!(
                "Unknown provider '{}'. Valid providers: {}",
                spec.provider,
                known.join(", ")
            ))
        })?;

        if spec.name.trim().is_empty() {
            return Err(ParleyError::Config(format!(
                "Model string '{}' has no model name",
                spec
            )));
        }

        let provider = factory(spec, settings)?;
        tracing::info!(
            target: "parley.llm.registry",
            model = %spec,
            provider = provider.name(),
            "built chat model handle"
        );
        Ok(ChatModelHandle::new(spec.clone(), provider))
    }
}

fn build_ollama(_spec: &ModelSpec, settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    Ok(Arc::new(OllamaProvider::with_base_url(
        &settings.providers.ollama.base_url,
    )))
}

fn build_cloud(spec: &ModelSpec, settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    let config = settings.cloud_provider(spec.provider).ok_or_else(|| {
        ParleyError::Config(format!("{} is not a cloud provider", spec.provider))
    })?;
    let api_key = settings.api_key(spec.provider).ok_or_else(|| {
        ParleyError::Config(format!(
            "{} is not set. Export it or add providers.{}.api_key to your settings.",
            config.api_key_env, spec.provider
        ))
    })?;

    Ok(Arc::new(OpenAiCompatProvider::new(
        spec.provider.tag(),
        api_key,
        &config.base_url,
    )))
}

/// Snapshot of models installed in the local runtime
pub async fn list_local_models(settings: &Settings) -> Result<Vec<String>> {
    OllamaProvider::with_base_url(&settings.providers.ollama.base_url)
        .list_local_models()
        .await
}

/// Models selectable for `kind`: discovered for the local runtime, curated otherwise
pub async fn available_models(kind: ProviderKind, settings: &Settings) -> Result<Vec<String>> {
    if kind.is_local() {
        list_local_models(settings).await
    } else {
        Ok(kind.catalogue().iter().map(|m| m.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock_provider::MockProvider;

    fn mock_factory() -> ProviderFactory {
        Arc::new(|_: &ModelSpec, _: &Settings| {
            Ok(Arc::new(MockProvider::new()) as Arc<dyn LlmProvider>)
        })
    }

    #[test]
    fn test_build_ollama_needs_no_credentials() {
        let registry = ProviderRegistry::with_defaults();
        let handle = registry
            .build(&ModelSpec::parse("qwen3:14b"), &Settings::default())
            .unwrap();
        assert_eq!(handle.provider.name(), "ollama");
        assert_eq!(handle.model_name(), "qwen3:14b");
    }

    #[test]
    fn test_build_cloud_with_file_key() {
        let mut settings = Settings::default();
        settings.providers.deepseek.api_key = Some("sk-file".to_string());
        // Point the env lookup at a variable that is never set.
        settings.providers.deepseek.api_key_env = "PARLEY_TEST_UNSET_DEEPSEEK".to_string();

        let handle = ProviderRegistry::with_defaults()
            .build(&ModelSpec::parse("deepseek/deepseek-chat"), &settings)
            .unwrap();
        assert_eq!(handle.provider.name(), "deepseek");
    }

    #[test]
    fn test_build_cloud_without_key_is_config_error() {
        let mut settings = Settings::default();
        settings.providers.openai.api_key_env = "PARLEY_TEST_UNSET_OPENAI".to_string();

        let err = ProviderRegistry::with_defaults()
            .build(&ModelSpec::parse("openai/gpt-4o"), &settings)
            .unwrap_err();
        assert!(matches!(err, ParleyError::Config(ref m) if m.contains("PARLEY_TEST_UNSET_OPENAI")));
    }

    #[test]
    fn test_unregistered_provider_is_config_error() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Ollama, mock_factory());

        let err = registry
            .build(&ModelSpec::parse("openai/gpt-4o"), &Settings::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown provider 'openai'. Valid providers: ollama"
        );
    }

    #[test]
    fn test_only_requested_factory_runs() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ProviderKind::OpenAi,
            Arc::new(|_: &ModelSpec, _: &Settings| {
                Err(ParleyError::Config("openai unavailable".to_string()))
            }),
        );
        registry.register(ProviderKind::Ollama, mock_factory());

        assert!(registry
            .build(&ModelSpec::parse("llama3"), &Settings::default())
            .is_ok());
    }

    #[test]
    fn test_empty_model_name_rejected() {
        let err = ProviderRegistry::with_defaults()
            .build(&ModelSpec::parse("ollama/"), &Settings::default())
            .unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[tokio::test]
    async fn test_available_models_cloud_catalogue() {
        let models = available_models(ProviderKind::DeepSeek, &Settings::default())
            .await
            .unwrap();
        assert_eq!(models, vec!["deepseek-chat", "deepseek-reasoner"]);
    }
}
