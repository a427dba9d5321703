//! Agent units, their registry, and the rule-based router

pub mod catalog;
pub mod configurable;
pub mod registry;
pub mod router;

use crate::llm::TextStream;
use crate::types::{ContextBundle, Result};
use async_trait::async_trait;

// Re-export commonly used types
pub use catalog::AgentDefinition;
pub use configurable::ConfigurableAgent;
pub use registry::{AgentDescriptor, AgentRegistry, AgentRegistryBuilder};
pub use router::{RoutingDecision, RoutingRule, Router, RuleMatch};

/// Agent-to-agent consultation, routed through the coordinator.
///
/// Agents never hold references to each other; every consultation goes
/// through this handle so it is logged like any other agent call.
#[async_trait]
pub trait Consult: Send + Sync {
    async fn consult(&self, target: &str, query: &str, context: &ContextBundle) -> Result<String>;
}

/// A handle that refuses every consultation.
pub struct NoConsult;

#[async_trait]
impl Consult for NoConsult {
    async fn consult(&self, target: &str, _query: &str, _context: &ContextBundle) -> Result<String> {
        Err(crate::types::AppError::AgentCallFailed {
            agent: target.to_string(),
            reason: "consultation not available".to_string(),
        })
    }
}

/// Base trait for all agents
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Answer `query` given the assembled context.
    async fn respond(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> Result<String>;

    /// Streaming variant of [`Agent::respond`]. Defaults to a single chunk.
    async fn respond_stream(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> Result<TextStream> {
        let text = self.respond(query, context, consult).await?;
        Ok(Box::new(futures::stream::iter(vec![Ok(text)])))
    }
}
