//! Agent Registry
//!
//! An immutable lookup table of agent units, built once at startup and shared
//! read-only (`Arc<AgentRegistry>`) by the router and coordinator. Registration
//! order is preserved: it is the order in which supporting agents run.

use crate::agents::catalog::{self, AgentDefinition};
use crate::agents::configurable::ConfigurableAgent;
use crate::agents::Agent;
use crate::llm::ProviderRegistry;
use crate::types::{AppError, ModelTier, Result};
use crate::utils::toml_config::PilotConfig;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Identity and capabilities of a registered agent. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDescriptor {
    /// Stable capability key, e.g. `research`
    pub id: String,
    pub display_name: String,
    pub capability_tags: BTreeSet<String>,
    pub model_tier: ModelTier,
    /// Supporting agents used when this agent is primary and the caller gives none
    pub default_supporting: Vec<String>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            capability_tags: BTreeSet::new(),
            model_tier: ModelTier::Standard,
            default_supporting: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capability_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    pub fn with_supporting<I, S>(mut self, supporting: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_supporting = supporting.into_iter().map(Into::into).collect();
        self
    }
}

/// Registry of agent units keyed by id
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Build the registry from configuration, creating one LLM client per agent.
    ///
    /// An agent with an explicit `model` uses it; otherwise its tier binding is used.
    pub async fn from_config(
        config: &PilotConfig,
        provider_registry: &ProviderRegistry,
    ) -> Result<Self> {
        let mut builder = AgentRegistryBuilder::new();

        for definition in catalog::resolve_definitions(config) {
            let llm = match &definition.model {
                Some(model) => provider_registry.create_client_for_model(model).await?,
                None => {
                    provider_registry
                        .create_client_for_tier(definition.descriptor.model_tier)
                        .await?
                }
            };

            tracing::debug!(
                agent = %definition.descriptor.id,
                model = %llm.model_name(),
                "Created agent"
            );
            builder = builder.with_agent(Arc::new(ConfigurableAgent::new(definition, llm)));
        }

        builder.build()
    }

    /// Look up an agent by id
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Agent>> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    /// Look up an agent by id, failing with [`AppError::UnknownAgent`]
    pub fn require(&self, id: &str) -> Result<&Arc<dyn Agent>> {
        self.get(id)
            .ok_or_else(|| AppError::UnknownAgent(id.to_string()))
    }

    pub fn descriptor(&self, id: &str) -> Option<&AgentDescriptor> {
        self.get(id).map(|agent| agent.descriptor())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position of an agent in registration order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Agent ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.id())
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter().map(|a| a.descriptor())
    }

    /// Sorts ids into registration order; unknown ids sort last.
    pub fn sort_by_registration(&self, ids: &mut [String]) {
        ids.sort_by_key(|id| self.position(id).unwrap_or(usize::MAX));
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Builder for creating AgentRegistry with fluent API
pub struct AgentRegistryBuilder {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistryBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Register an agent; registration order is kept
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Register a definition backed by an explicit LLM client
    pub fn with_definition(
        self,
        definition: AgentDefinition,
        llm: Box<dyn crate::llm::LLMClient>,
    ) -> Self {
        self.with_agent(Arc::new(ConfigurableAgent::new(definition, llm)))
    }

    /// Build the AgentRegistry
    ///
    /// Fails on duplicate ids, an empty registry, or default supporting
    /// agents that are not registered.
    pub fn build(self) -> Result<AgentRegistry> {
        if self.agents.is_empty() {
            return Err(AppError::Configuration(
                "AgentRegistry requires at least one agent".into(),
            ));
        }

        let mut index = HashMap::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            if index.insert(agent.id().to_string(), i).is_some() {
                return Err(AppError::Configuration(format!(
                    "Agent '{}' registered twice",
                    agent.id()
                )));
            }
        }

        for agent in &self.agents {
            for supporting in &agent.descriptor().default_supporting {
                if !index.contains_key(supporting) {
                    return Err(AppError::Configuration(format!(
                        "Agent '{}' lists unknown supporting agent '{}'",
                        agent.id(),
                        supporting
                    )));
                }
            }
        }

        Ok(AgentRegistry {
            agents: self.agents,
            index,
        })
    }
}

impl Default for AgentRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Consult;
    use crate::types::ContextBundle;
    use async_trait::async_trait;

    struct Echo(AgentDescriptor);

    #[async_trait]
    impl Agent for Echo {
        fn descriptor(&self) -> &AgentDescriptor {
            &self.0
        }

        async fn respond(&self, query: &str, _: &ContextBundle, _: &dyn Consult) -> Result<String> {
            Ok(query.to_string())
        }
    }

    fn echo(id: &str, supporting: &[&str]) -> Arc<dyn Agent> {
        Arc::new(Echo(
            AgentDescriptor::new(id, id).with_supporting(supporting.iter().copied()),
        ))
    }

    #[test]
    fn test_registration_order_is_kept() {
        let registry = AgentRegistryBuilder::new()
            .with_agent(echo("b", &[]))
            .with_agent(echo("a", &["b"]))
            .build()
            .unwrap();

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(registry.position("a"), Some(1));

        let mut ids = vec!["zz".to_string(), "a".to_string(), "b".to_string()];
        registry.sort_by_registration(&mut ids);
        assert_eq!(ids, vec!["b", "a", "zz"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = AgentRegistryBuilder::new()
            .with_agent(echo("a", &[]))
            .with_agent(echo("a", &[]))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_supporting_rejected() {
        let result = AgentRegistryBuilder::new()
            .with_agent(echo("a", &["ghost"]))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(AgentRegistryBuilder::new().build().is_err());
    }

    #[test]
    fn test_require_unknown() {
        let registry = AgentRegistryBuilder::new()
            .with_agent(echo("a", &[]))
            .build()
            .unwrap();
        assert!(matches!(
            registry.require("nope"),
            Err(AppError::UnknownAgent(id)) if id == "nope"
        ));
    }
}
