//! Mock implementations for testing.
//!
//! Scripted agents, LLM clients and collaborators shared across the
//! integration tests, so no test needs a running model server.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use prodpilot::agents::catalog;
use prodpilot::agents::{Agent, AgentDescriptor, AgentRegistry, AgentRegistryBuilder, Consult};
use prodpilot::llm::{LLMClient, TextStream};
use prodpilot::memory::HistoryStore;
use prodpilot::rag::KnowledgeProvider;
use prodpilot::types::{AppError, ContextBundle, KnowledgePassage, Message, Result};
use std::sync::Arc;
use std::time::Duration;

/// Mock LLM client with a fixed response, or a fixed failure.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    /// `(system, prompt)` pairs received so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls.lock().push((system.to_string(), prompt.to_string()));
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn stream_with_system(&self, system: &str, prompt: &str) -> Result<TextStream> {
        let text = self.generate_with_system(system, prompt).await?;
        let chunks: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|c| Ok(c.to_string()))
            .collect();
        Ok(Box::new(futures::stream::iter(chunks)))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// One call received by a [`ScriptedAgent`]
#[derive(Debug, Clone)]
pub struct ReceivedCall {
    pub query: String,
    pub context: ContextBundle,
}

/// Agent with scripted latency and failures that records what it receives.
///
/// Replies with `"<id>: answer"` unless a reply is set.
pub struct ScriptedAgent {
    descriptor: AgentDescriptor,
    reply: Option<String>,
    latency: Duration,
    fail: bool,
    fail_when_query_contains: Option<String>,
    consults: Vec<String>,
    received: Arc<Mutex<Vec<ReceivedCall>>>,
}

impl ScriptedAgent {
    pub fn new(id: &str) -> Self {
        Self {
            descriptor: AgentDescriptor::new(id, format!("{} agent", id)),
            reply: None,
            latency: Duration::ZERO,
            fail: false,
            fail_when_query_contains: None,
            consults: Vec::new(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Fails only for queries containing `needle`
    pub fn failing_when(mut self, needle: &str) -> Self {
        self.fail_when_query_contains = Some(needle.to_string());
        self
    }

    pub fn with_supporting(mut self, supporting: &[&str]) -> Self {
        self.descriptor = self.descriptor.with_supporting(supporting.iter().copied());
        self
    }

    /// Consults `target` before answering
    pub fn consulting(mut self, target: &str) -> Self {
        self.consults.push(target.to_string());
        self
    }

    /// Shared handle on the calls this agent receives
    pub fn received(&self) -> Arc<Mutex<Vec<ReceivedCall>>> {
        Arc::clone(&self.received)
    }

    async fn answer(&self, query: &str, context: &ContextBundle, consult: &dyn Consult) -> Result<String> {
        self.received.lock().push(ReceivedCall {
            query: query.to_string(),
            context: context.clone(),
        });

        for target in &self.consults {
            let _ = consult.consult(target, query, context).await;
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let should_fail = self.fail
            || self
                .fail_when_query_contains
                .as_deref()
                .is_some_and(|needle| query.contains(needle));
        if should_fail {
            return Err(AppError::LLM(format!("{} is down", self.descriptor.id)));
        }

        Ok(self
            .reply
            .clone()
            .unwrap_or_else(|| format!("{}: answer", self.descriptor.id)))
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn respond(&self, query: &str, context: &ContextBundle, consult: &dyn Consult) -> Result<String> {
        self.answer(query, context, consult).await
    }

    async fn respond_stream(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> Result<TextStream> {
        let text = self.answer(query, context, consult).await?;
        let chunks: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|c| Ok(c.to_string()))
            .collect();
        Ok(Box::new(futures::stream::iter(chunks)))
    }
}

/// Registry of the given agents, in order.
pub fn registry_of(agents: Vec<ScriptedAgent>) -> Arc<AgentRegistry> {
    let builder = agents
        .into_iter()
        .fold(AgentRegistryBuilder::new(), |b, agent| b.with_agent(Arc::new(agent)));
    Arc::new(builder.build().expect("valid test registry"))
}

/// Scripted agents for every built-in catalog id with the catalog's supporting sets.
pub fn catalog_agents() -> Vec<ScriptedAgent> {
    catalog::builtin_definitions()
        .into_iter()
        .map(|def| {
            let supporting: Vec<&str> = def
                .descriptor
                .default_supporting
                .iter()
                .map(String::as_str)
                .collect();
            ScriptedAgent::new(&def.descriptor.id).with_supporting(&supporting)
        })
        .collect()
}

/// Catalog agents with the agent sharing `replacement`'s id swapped in place.
///
/// The replacement keeps the catalog's supporting set.
pub fn catalog_agents_with(replacement: ScriptedAgent) -> Vec<ScriptedAgent> {
    let mut agents = catalog_agents();
    if let Some(slot) = agents
        .iter_mut()
        .find(|agent| agent.descriptor().id == replacement.descriptor().id)
    {
        let supporting = slot.descriptor().default_supporting.clone();
        let mut replacement = replacement;
        replacement.descriptor = replacement.descriptor.with_supporting(supporting);
        *slot = replacement;
    }
    agents
}

/// Knowledge provider that fails every search.
pub struct FailingKnowledgeProvider;

#[async_trait]
impl KnowledgeProvider for FailingKnowledgeProvider {
    async fn search(&self, _query: &str, _scope_id: &str, _top_k: usize) -> Result<Vec<KnowledgePassage>> {
        Err(AppError::Internal("retrieval service unavailable".to_string()))
    }
}

/// Knowledge provider returning fixed passages and counting calls.
pub struct FixedKnowledgeProvider {
    pub passages: Vec<KnowledgePassage>,
    pub calls: Mutex<Vec<(String, String, usize)>>,
}

impl FixedKnowledgeProvider {
    pub fn new(passages: Vec<KnowledgePassage>) -> Self {
        Self {
            passages,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl KnowledgeProvider for FixedKnowledgeProvider {
    async fn search(&self, query: &str, scope_id: &str, top_k: usize) -> Result<Vec<KnowledgePassage>> {
        self.calls
            .lock()
            .push((query.to_string(), scope_id.to_string(), top_k));
        Ok(self.passages.clone())
    }
}

/// History store that fails every load.
pub struct FailingHistoryStore;

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn load_recent(&self, _scope: &str, _session: &str, _max: usize) -> Result<Vec<Message>> {
        Err(AppError::Internal("history unavailable".to_string()))
    }
}
