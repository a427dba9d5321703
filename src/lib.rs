//! # Prodpilot
//!
//! A multi-agent coordination engine for a product-management assistant.
//! Queries are routed to specialized LLM-backed agents (research, analysis,
//! validation, strategy, ideation, authoring, integration, technical) whose
//! answers are combined under one of four coordination modes.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use prodpilot::{AgentRegistry, Coordinator, CoordinationRequest, PilotConfig, ProviderRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PilotConfig::load("prodpilot.toml")?;
//!     let providers = ProviderRegistry::from_config(&config);
//!     let registry = Arc::new(AgentRegistry::from_config(&config, &providers).await?);
//!
//!     let coordinator = Coordinator::builder(registry).with_config(&config)?.build()?;
//!     let result = coordinator
//!         .coordinate(CoordinationRequest::new("debug this function"))
//!         .await?;
//!
//!     println!("{}", result.final_response_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Coordination Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | `sequential` | Primary then supporting agents; each sees the previous output |
//! | `parallel` | All agents at once; answers concatenated with a summary |
//! | `collaborative` | Supporting agents consulted, then the primary answers (default) |
//! | `debate` | Two rounds among participants, then one synthesis call |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI API support |
//!
//! ## Modules
//!
//! - [`agents`] - Agent units, registry and router
//! - [`coordination`] - Coordinator, execution modes and interaction log
//! - [`memory`] - Conversation history and context assembly
//! - [`rag`] - Knowledge retrieval
//! - [`llm`] - LLM client implementations
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Agent units, registry and rule-based router.
pub mod agents;
/// Command-line interface for the prodpilot binary.
pub mod cli;
/// Multi-agent coordination engine.
pub mod coordination;
/// LLM provider clients and abstractions.
pub mod llm;
/// Conversation memory and context assembly.
pub mod memory;
/// Knowledge retrieval.
pub mod rag;
/// Core types (requests, results, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use agents::{Agent, AgentRegistry, AgentRegistryBuilder, Consult, Router};
pub use coordination::{Coordinator, CoordinatorBuilder, InteractionLog};
pub use llm::{LLMClient, Provider, ProviderRegistry};
pub use memory::{ContextAssembler, ContextLimits, HistoryStore, InMemoryHistoryStore};
pub use rag::{KnowledgeProvider, StaticKnowledgeProvider};
pub use types::{
    AgentInteraction, AppError, CoordinationFailure, CoordinationMode, CoordinationRequest,
    CoordinationResult, Result,
};
pub use utils::toml_config::{PilotConfig, PilotConfigManager};
