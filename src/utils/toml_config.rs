//! TOML-based configuration for Prodpilot
//!
//! This module provides declarative configuration for providers, models,
//! model tiers, agents, routing rules and coordination limits via a TOML file
//! (`prodpilot.toml`). Every section is optional; an empty file yields the
//! built-in agent catalog and routing table.
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `PilotConfigManager` for thread-safe access to the current configuration.

use crate::agents::catalog;
use crate::types::{CoordinationMode, ModelTier, OutputFormat};
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from prodpilot.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named LLM provider configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Named model configurations that reference providers
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Model bound to each tier
    #[serde(default)]
    pub tiers: TierConfig,

    /// Agent definitions and overrides of built-in agents
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub routing: RoutingConfig,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        default_model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        default_model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

// ============= Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Reference to a provider name defined in [providers]
    pub provider: String,

    /// Model name/identifier to use with the provider
    pub model: String,
}

/// `[tiers]`: model name bound to each [`ModelTier`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierConfig {
    pub fast: Option<String>,
    pub standard: Option<String>,
    pub high_quality: Option<String>,
}

impl TierConfig {
    pub fn bindings(&self) -> HashMap<ModelTier, String> {
        [
            (ModelTier::Fast, &self.fast),
            (ModelTier::Standard, &self.standard),
            (ModelTier::HighQuality, &self.high_quality),
        ]
        .into_iter()
        .filter_map(|(tier, model)| model.clone().map(|m| (tier, m)))
        .collect()
    }
}

// ============= Agent Configuration =============

/// An agent definition. For built-in agents every field is an optional override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub tier: Option<ModelTier>,

    /// Explicit model name; takes precedence over `tier`
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub capability_tags: Option<Vec<String>>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub output_format: Option<OutputFormat>,

    /// Default supporting agents when this agent is primary
    #[serde(default)]
    pub supporting: Option<Vec<String>>,

    /// Agents consulted (through the coordinator) before this agent answers
    #[serde(default)]
    pub consults: Option<Vec<String>>,
}

// ============= Coordination Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub default_mode: CoordinationMode,

    /// Agent selected when no routing rule matches
    #[serde(default = "default_agent")]
    pub default_agent: String,

    #[serde(default = "default_per_call_timeout")]
    pub per_call_timeout_secs: u64,

    /// 0 derives the aggregate timeout from the worst-case cost of the mode
    #[serde(default)]
    pub request_timeout_secs: u64,

    #[serde(default = "default_debate_rounds")]
    pub debate_rounds: u8,

    #[serde(default = "default_debate_max_participants")]
    pub debate_max_participants: usize,

    /// Dedicated debate synthesizer; defaults to the primary agent
    #[serde(default)]
    pub synthesizer_agent: Option<String>,
}

fn default_agent() -> String {
    catalog::GENERAL.to_string()
}

fn default_per_call_timeout() -> u64 {
    60
}

fn default_debate_rounds() -> u8 {
    2
}

fn default_debate_max_participants() -> usize {
    3
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            default_mode: CoordinationMode::default(),
            default_agent: default_agent(),
            per_call_timeout_secs: default_per_call_timeout(),
            request_timeout_secs: 0,
            debate_rounds: default_debate_rounds(),
            debate_max_participants: default_debate_max_participants(),
            synthesizer_agent: None,
        }
    }
}

// ============= Context Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_history_turns")]
    pub max_history_turns: usize,

    #[serde(default = "default_budget_tokens")]
    pub budget_tokens: usize,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

fn default_top_k() -> usize {
    crate::memory::DEFAULT_TOP_K
}

fn default_history_turns() -> usize {
    crate::memory::DEFAULT_HISTORY_WINDOW
}

fn default_budget_tokens() -> usize {
    crate::memory::DEFAULT_CONTEXT_BUDGET
}

fn default_lookup_timeout() -> u64 {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_history_turns: default_history_turns(),
            budget_tokens: default_budget_tokens(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

impl ContextConfig {
    pub fn limits(&self) -> crate::memory::ContextLimits {
        crate::memory::ContextLimits {
            top_k: self.top_k,
            max_history_turns: self.max_history_turns,
            budget_tokens: self.budget_tokens,
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
        }
    }
}

// ============= Routing Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Replaces the built-in rule table when non-empty; order is priority
    #[serde(default)]
    pub rules: Vec<RoutingRuleConfig>,

    /// Replaces the built-in debate phrases
    #[serde(default)]
    pub debate_phrases: Option<Vec<String>>,

    /// Replaces the built-in parallel phrases
    #[serde(default)]
    pub parallel_phrases: Option<Vec<String>>,
}

/// One `[[routing.rules]]` entry; exactly one of `any` / `all` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuleConfig {
    pub name: String,
    pub agent: String,
    #[serde(default)]
    pub any: Vec<String>,
    #[serde(default)]
    pub all: Vec<String>,
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' referenced by model '{1}' does not exist")]
    MissingProvider(String, String),

    #[error("Model '{0}' referenced by {1} does not exist")]
    MissingModel(String, String),

    #[error("Agent '{0}' referenced by {1} does not exist")]
    MissingAgent(String, String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl PilotConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: PilotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// All agent ids known to this configuration (built-in and configured)
    pub fn agent_ids(&self) -> HashSet<String> {
        catalog::builtin_ids()
            .into_iter()
            .map(String::from)
            .chain(self.agents.keys().cloned())
            .collect()
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in self.providers.values() {
            if let ProviderConfig::OpenAI { api_key_env, .. } = provider {
                self.validate_env_var(api_key_env)?;
            }
        }

        // Validate model -> provider references
        for (model_name, model_config) in &self.models {
            if !self.providers.contains_key(&model_config.provider) {
                return Err(ConfigError::MissingProvider(
                    model_config.provider.clone(),
                    model_name.clone(),
                ));
            }
        }

        // Validate tier -> model references
        for (tier, model) in self.tiers.bindings() {
            if !self.models.contains_key(&model) {
                return Err(ConfigError::MissingModel(model, format!("tier '{}'", tier)));
            }
        }

        let agent_ids = self.agent_ids();
        let require_agent = |id: &str, referrer: String| -> Result<(), ConfigError> {
            if agent_ids.contains(id) {
                Ok(())
            } else {
                Err(ConfigError::MissingAgent(id.to_string(), referrer))
            }
        };

        // Validate agent -> model and agent -> agent references
        for (agent_name, agent_config) in &self.agents {
            if let Some(model) = &agent_config.model
                && !self.models.contains_key(model)
            {
                return Err(ConfigError::MissingModel(
                    model.clone(),
                    format!("agent '{}'", agent_name),
                ));
            }

            let referrer = format!("agent '{}'", agent_name);
            for id in agent_config.supporting.iter().flatten() {
                require_agent(id, referrer.clone())?;
            }
            for id in agent_config.consults.iter().flatten() {
                require_agent(id, referrer.clone())?;
                if id == agent_name {
                    return Err(ConfigError::ValidationError(format!(
                        "Agent '{}' cannot consult itself",
                        agent_name
                    )));
                }
            }
        }

        require_agent(
            &self.coordination.default_agent,
            "coordination.default_agent".to_string(),
        )?;
        if let Some(synth) = &self.coordination.synthesizer_agent {
            require_agent(synth, "coordination.synthesizer_agent".to_string())?;
        }

        for rule in &self.routing.rules {
            require_agent(&rule.agent, format!("routing rule '{}'", rule.name))?;
            if rule.any.is_empty() == rule.all.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Routing rule '{}' must set exactly one of 'any' or 'all'",
                    rule.name
                )));
            }
        }

        if self.coordination.debate_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "coordination.debate_rounds must be at least 1".into(),
            ));
        }
        if self.coordination.debate_max_participants == 0 {
            return Err(ConfigError::ValidationError(
                "coordination.debate_max_participants must be at least 1".into(),
            ));
        }
        if self.coordination.per_call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "coordination.per_call_timeout_secs must be at least 1".into(),
            ));
        }
        if self.context.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "context.top_k must be at least 1".into(),
            ));
        }
        if self.context.budget_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.budget_tokens must be at least 1".into(),
            ));
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get provider by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Get model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Get agent config by name
    pub fn get_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct PilotConfigManager {
    config: Arc<ArcSwap<PilotConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl PilotConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Convert to absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = PilotConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: PilotConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("prodpilot.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<PilotConfig> {
        self.config.load_full()
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    ///
    /// An invalid file leaves the current configuration in place.
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = PilotConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        // Debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the config file's parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce_duration) {
                    continue;
                }

                // Wait a bit for file write to complete
                tokio::time::sleep(Duration::from_millis(100)).await;

                match PilotConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}
