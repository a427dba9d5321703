use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============= Request / Response Types =============

/// A caller-supplied request for one coordination run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_primary_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_supporting_agents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CoordinationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    /// Used to load history from the history store when `conversation_history` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CoordinationRequest {
    /// Creates a request with only a query; everything else is routed automatically.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_primary(mut self, agent: impl Into<String>) -> Self {
        self.explicit_primary_agent = Some(agent.into());
        self
    }

    pub fn with_supporting<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit_supporting_agents = Some(agents.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_mode(mut self, mode: CoordinationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The outcome of a successful coordination run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub request_id: Uuid,
    pub primary_agent_id: String,
    pub supporting_agent_ids: Vec<String>,
    pub final_response_text: String,
    /// Insertion order is completion order.
    pub interactions: Vec<AgentInteraction>,
    pub mode: CoordinationMode,
    /// True if one or more non-primary calls failed but a usable answer was produced.
    pub degraded: bool,
    /// Absorbed degradations (retrieval unavailable, rejected overrides, ...).
    #[serde(default)]
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl CoordinationResult {
    /// Number of recorded agent calls that returned a response.
    pub fn succeeded_calls(&self) -> usize {
        self.interactions.iter().filter(|i| i.is_success()).count()
    }

    /// Number of recorded agent calls that failed or timed out.
    pub fn failed_calls(&self) -> usize {
        self.interactions.iter().filter(|i| !i.is_success()).count()
    }

    /// Interactions that completed with a response.
    pub fn successful_interactions(&self) -> impl Iterator<Item = &AgentInteraction> {
        self.interactions.iter().filter(|i| i.is_success())
    }
}

// ============= Agent Types =============

/// How multiple agents are combined for one request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationMode {
    Sequential,
    Parallel,
    #[default]
    Collaborative,
    Debate,
}

impl CoordinationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationMode::Sequential => "sequential",
            CoordinationMode::Parallel => "parallel",
            CoordinationMode::Collaborative => "collaborative",
            CoordinationMode::Debate => "debate",
        }
    }
}

impl fmt::Display for CoordinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CoordinationMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "pipeline" => Ok(CoordinationMode::Sequential),
            "parallel" => Ok(CoordinationMode::Parallel),
            "collaborative" => Ok(CoordinationMode::Collaborative),
            "debate" | "enhanced-collaborative" | "enhanced_collaborative" => {
                Ok(CoordinationMode::Debate)
            }
            other => Err(AppError::InvalidInput(format!(
                "Unknown coordination mode '{}'",
                other
            ))),
        }
    }
}

/// Cost/latency class of the model behind an agent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTier {
    Fast,
    #[default]
    Standard,
    HighQuality,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Standard => "standard",
            ModelTier::HighQuality => "high-quality",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output contract of an agent unit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    /// Output must parse as JSON; anything else is a malformed response.
    Json,
}

/// Lifecycle of a single coordination run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationState {
    Selecting,
    Executing,
    Synthesizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

// ============= Context Types =============

/// A retrieved knowledge passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgePassage {
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Used to break score ties (most recent first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl KnowledgePassage {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            source: None,
            updated_at: None,
        }
    }
}

/// Extra material the coordinator appends for a single agent call
/// (a previous agent's output, consultation answers, debate rounds).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSection {
    pub label: String,
    pub text: String,
}

/// The bounded context handed to every agent call of one request.
///
/// Shared read-only between concurrent calls; the coordinator derives
/// per-call variants with [`ContextBundle::with_section`] instead of mutating it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextBundle {
    pub retrieved_knowledge: Vec<KnowledgePassage>,
    pub history_window: Vec<Message>,
    pub caller_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub sections: Vec<ContextSection>,
    /// Upper bound on [`ContextBundle::estimated_tokens`], set by the assembler.
    /// Sections appended later are cut to fit; `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<usize>,
}

impl ContextBundle {
    /// Returns a copy with one more section appended.
    ///
    /// With a budget, the section text is cut to the tokens left; a section
    /// whose label alone does not fit is left out.
    pub fn with_section(&self, label: impl Into<String>, text: impl Into<String>) -> Self {
        let label = label.into();
        let mut text = text.into();
        let mut bundle = self.clone();

        if let Some(remaining) = self.remaining_tokens() {
            let label_tokens = crate::memory::estimate_tokens(&label);
            if label_tokens >= remaining {
                tracing::debug!(section = %label, "Context budget exhausted; section left out");
                return bundle;
            }
            text = crate::memory::truncate_to_tokens(&text, remaining - label_tokens);
        }

        bundle.sections.push(ContextSection { label, text });
        bundle
    }

    /// Tokens still available under the budget, if there is one.
    pub fn remaining_tokens(&self) -> Option<usize> {
        self.budget_tokens
            .map(|budget| budget.saturating_sub(self.estimated_tokens()))
    }

    /// Estimated size in tokens of everything the bundle renders.
    pub fn estimated_tokens(&self) -> usize {
        let sections: usize = self
            .sections
            .iter()
            .map(|s| crate::memory::estimate_tokens(&s.label) + crate::memory::estimate_tokens(&s.text))
            .sum();
        crate::memory::estimate_bundle_tokens(
            &self.retrieved_knowledge,
            &self.history_window,
            &self.caller_metadata,
        ) + sections
    }

    pub fn is_empty(&self) -> bool {
        self.retrieved_knowledge.is_empty()
            && self.history_window.is_empty()
            && self.caller_metadata.is_empty()
            && self.sections.is_empty()
    }

    /// Serializes the bundle into the text block prepended to an agent prompt.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if !self.retrieved_knowledge.is_empty() {
            let passages: Vec<String> = self
                .retrieved_knowledge
                .iter()
                .enumerate()
                .map(|(i, p)| match &p.source {
                    Some(source) => format!("[{}] ({}, {:.2}) {}", i + 1, source, p.score, p.text),
                    None => format!("[{}] ({:.2}) {}", i + 1, p.score, p.text),
                })
                .collect();
            parts.push(format!("Relevant knowledge:\n{}", passages.join("\n")));
        }

        if !self.history_window.is_empty() {
            let turns: Vec<String> = self
                .history_window
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect();
            parts.push(format!("Conversation so far:\n{}", turns.join("\n")));
        }

        if !self.caller_metadata.is_empty() {
            let meta: Vec<String> = self
                .caller_metadata
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect();
            parts.push(format!("Request metadata:\n{}", meta.join("\n")));
        }

        for section in &self.sections {
            parts.push(format!("{}:\n{}", section.label, section.text));
        }

        parts.join("\n\n")
    }
}

// ============= Interaction Types =============

/// Who issued an agent call.
pub const COORDINATOR: &str = "coordinator";

/// One logged agent invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInteraction {
    pub id: Uuid,
    pub request_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub query_text: String,
    /// Empty when the call failed.
    pub response_text: String,
    pub timestamp: DateTime<Utc>,
    pub mode: CoordinationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u8>,
    /// Error marker; `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentInteraction {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent '{agent}' call failed: {reason}")]
    AgentCallFailed { agent: String, reason: String },

    #[error("Agent '{agent}' returned malformed output: {reason}")]
    MalformedOutput { agent: String, reason: String },

    #[error("Context assembly degraded: {0}")]
    ContextAssemblyDegraded(String),

    #[error("Request timed out after {0} ms")]
    RequestTimeout(u64),

    #[error("All agents failed ({succeeded} succeeded, {failed} failed)")]
    AllAgentsFailed { succeeded: usize, failed: usize },

    #[error("Request cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors that are absorbed locally and never fail a request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::UnknownAgent(_) | AppError::ContextAssemblyDegraded(_)
        )
    }

    /// Maps any per-call failure into the `AgentCallFailed` kind recorded by the coordinator.
    pub fn into_agent_call_failed(self, agent: &str) -> AppError {
        match self {
            AppError::AgentCallFailed { .. } => self,
            other => AppError::AgentCallFailed {
                agent: agent.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// A coordination run that did not produce an answer.
///
/// Carries the partial interaction log for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{mode} coordination failed: {cause} ({succeeded} calls succeeded, {failed} failed)")]
pub struct CoordinationFailure {
    pub request_id: Uuid,
    pub mode: CoordinationMode,
    #[source]
    pub cause: AppError,
    pub interactions: Vec<AgentInteraction>,
    pub succeeded: usize,
    pub failed: usize,
}

impl CoordinationFailure {
    pub fn new(
        request_id: Uuid,
        mode: CoordinationMode,
        cause: AppError,
        interactions: Vec<AgentInteraction>,
    ) -> Self {
        let succeeded = interactions.iter().filter(|i| i.is_success()).count();
        let failed = interactions.len() - succeeded;
        Self {
            request_id,
            mode,
            cause,
            interactions,
            succeeded,
            failed,
        }
    }
}
