//! Provider Registry for managing multiple LLM providers
//!
//! This module provides a registry for managing named LLM providers and
//! models configured via TOML, and for resolving an agent's [`ModelTier`]
//! to a concrete model.
//!
//! Resolution chain: tier → model name (`[tiers]`) → model (`[models.*]`)
//! → provider (`[providers.*]`).

use crate::llm::client::{LLMClient, Provider};
use crate::types::{AppError, ModelTier, Result};
use crate::utils::toml_config::{ModelConfig, PilotConfig, ProviderConfig};
use std::collections::HashMap;

/// Registry for managing multiple named LLM providers
pub struct ProviderRegistry {
    /// Provider configurations keyed by name
    providers: HashMap<String, ProviderConfig>,
    /// Model configurations keyed by name
    models: HashMap<String, ModelConfig>,
    /// Model name bound to each tier
    tiers: HashMap<ModelTier, String>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            tiers: HashMap::new(),
        }
    }

    /// Create a provider registry from TOML configuration
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            providers: config.providers.clone(),
            models: config.models.clone(),
            tiers: config.tiers.bindings(),
        }
    }

    /// Register a provider configuration
    pub fn register_provider(&mut self, name: &str, config: ProviderConfig) {
        self.providers.insert(name.to_string(), config);
    }

    /// Register a model configuration
    pub fn register_model(&mut self, name: &str, config: ModelConfig) {
        self.models.insert(name.to_string(), config);
    }

    /// Bind a tier to a model name
    pub fn bind_tier(&mut self, tier: ModelTier, model_name: &str) {
        self.tiers.insert(tier, model_name.to_string());
    }

    /// Get a model configuration by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Model name bound to a tier
    pub fn model_for_tier(&self, tier: ModelTier) -> Option<&str> {
        self.tiers.get(&tier).map(String::as_str)
    }

    /// Resolve the provider for a model by name without creating a client
    pub fn resolve_model(&self, model_name: &str) -> Result<Provider> {
        let model_config = self.get_model(model_name).ok_or_else(|| {
            AppError::Configuration(format!("Model '{}' not found in configuration", model_name))
        })?;

        let provider_config = self.providers.get(&model_config.provider).ok_or_else(|| {
            AppError::Configuration(format!(
                "Provider '{}' referenced by model '{}' not found",
                model_config.provider, model_name
            ))
        })?;

        Provider::from_model_config(model_config, provider_config)
    }

    /// Create an LLM client for a specific model by name
    pub async fn create_client_for_model(&self, model_name: &str) -> Result<Box<dyn LLMClient>> {
        self.resolve_model(model_name)?.create_client().await
    }

    /// Create an LLM client for the model bound to `tier`
    ///
    /// Falls back to the `standard` binding when the tier itself is unbound.
    pub async fn create_client_for_tier(&self, tier: ModelTier) -> Result<Box<dyn LLMClient>> {
        let model_name = self
            .model_for_tier(tier)
            .or_else(|| self.model_for_tier(ModelTier::Standard))
            .ok_or_else(|| {
                AppError::Configuration(format!("No model bound to tier '{}'", tier))
            })?;

        tracing::debug!(tier = %tier, model = %model_name, "Resolved model tier");
        self.create_client_for_model(model_name).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
