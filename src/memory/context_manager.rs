//! Context assembly for agent calls.
//!
//! Produces one bounded [`ContextBundle`] per request from retrieved knowledge,
//! a trailing history window and caller metadata. Assembly never fails: an
//! unavailable retrieval service or history store only degrades the bundle.

use crate::memory::{
    estimate_message_tokens, estimate_metadata_tokens, estimate_tokens, truncate_history,
    HistoryStore, DEFAULT_CONTEXT_BUDGET, DEFAULT_HISTORY_WINDOW, DEFAULT_TOP_K,
};
use crate::rag::{rank_passages, KnowledgeProvider};
use crate::types::{AppError, ContextBundle, CoordinationRequest, Message};
use std::sync::Arc;
use std::time::Duration;

/// Scope used when a request carries no `scope_id`.
pub const DEFAULT_SCOPE: &str = "default";

/// Bounds applied while assembling a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// Maximum knowledge passages requested from retrieval.
    pub top_k: usize,
    /// Maximum history turns kept before budget eviction.
    pub max_history_turns: usize,
    /// Total budget in estimated tokens, shared with the current query.
    pub budget_tokens: usize,
    /// Upper bound on a single retrieval or history lookup.
    pub lookup_timeout: Duration,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_history_turns: DEFAULT_HISTORY_WINDOW,
            budget_tokens: DEFAULT_CONTEXT_BUDGET,
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

/// A bundle plus the degradations absorbed while building it.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub bundle: ContextBundle,
    pub warnings: Vec<String>,
    /// Knowledge passages dropped to fit the budget.
    pub evicted_passages: usize,
    /// History turns dropped to fit the budget.
    pub evicted_turns: usize,
}

/// Merges history, retrieved knowledge and caller metadata into a [`ContextBundle`].
pub struct ContextAssembler {
    knowledge: Option<Arc<dyn KnowledgeProvider>>,
    history: Option<Arc<dyn HistoryStore>>,
    limits: ContextLimits,
}

impl ContextAssembler {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            knowledge: None,
            history: None,
            limits,
        }
    }

    pub fn with_knowledge(mut self, provider: Arc<dyn KnowledgeProvider>) -> Self {
        self.knowledge = Some(provider);
        self
    }

    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    /// Assemble the context bundle for `request`. Read-only; never fails.
    pub async fn assemble(&self, request: &CoordinationRequest) -> AssembledContext {
        let scope = request.scope_id.as_deref().unwrap_or(DEFAULT_SCOPE);
        let mut warnings = Vec::new();

        let mut knowledge = match &self.knowledge {
            Some(provider) if self.limits.top_k > 0 => {
                let lookup = provider.search(&request.query, scope, self.limits.top_k);
                match tokio::time::timeout(self.limits.lookup_timeout, lookup).await {
                    Ok(Ok(passages)) => passages,
                    Ok(Err(e)) => {
                        let err = AppError::ContextAssemblyDegraded(format!("retrieval: {}", e));
                        tracing::warn!(scope = %scope, error = %e, "Knowledge retrieval failed, continuing without knowledge");
                        warnings.push(err.to_string());
                        Vec::new()
                    }
                    Err(_) => {
                        let err = AppError::ContextAssemblyDegraded(format!(
                            "retrieval timed out after {} ms",
                            self.limits.lookup_timeout.as_millis()
                        ));
                        tracing::warn!(scope = %scope, "Knowledge retrieval timed out, continuing without knowledge");
                        warnings.push(err.to_string());
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };
        rank_passages(&mut knowledge);
        knowledge.truncate(self.limits.top_k);

        let mut history = self.load_history(request, scope, &mut warnings).await;

        let mut metadata = request.metadata.clone();

        // The query is never evicted, so it is charged against the budget up front.
        let budget = self
            .limits
            .budget_tokens
            .saturating_sub(estimate_tokens(&request.query));

        let mut size: usize = knowledge.iter().map(|p| estimate_tokens(&p.text)).sum::<usize>()
            + history.iter().map(estimate_message_tokens).sum::<usize>()
            + metadata
                .iter()
                .map(|(k, v)| estimate_metadata_tokens(k, v))
                .sum::<usize>();

        let mut evicted_passages = 0;
        let mut evicted_turns = 0;

        while size > budget {
            if let Some(passage) = knowledge.pop() {
                size -= estimate_tokens(&passage.text);
                evicted_passages += 1;
            } else if !history.is_empty() {
                let turn = history.remove(0);
                size -= estimate_message_tokens(&turn);
                evicted_turns += 1;
            } else if let Some((key, value)) = metadata.pop_last() {
                size -= estimate_metadata_tokens(&key, &value);
            } else {
                break;
            }
        }

        if evicted_passages > 0 || evicted_turns > 0 {
            tracing::debug!(
                evicted_passages,
                evicted_turns,
                budget,
                "Context trimmed to fit budget"
            );
        }

        AssembledContext {
            bundle: ContextBundle {
                retrieved_knowledge: knowledge,
                history_window: history,
                caller_metadata: metadata,
                sections: Vec::new(),
                budget_tokens: Some(budget),
            },
            warnings,
            evicted_passages,
            evicted_turns,
        }
    }

    async fn load_history(
        &self,
        request: &CoordinationRequest,
        scope: &str,
        warnings: &mut Vec<String>,
    ) -> Vec<Message> {
        let max_turns = self.limits.max_history_turns;

        if !request.conversation_history.is_empty() {
            return truncate_history(&request.conversation_history, max_turns);
        }

        let (Some(store), Some(session_id)) = (&self.history, request.session_id.as_deref())
        else {
            return Vec::new();
        };

        let lookup = store.load_recent(scope, session_id, max_turns);
        match tokio::time::timeout(self.limits.lookup_timeout, lookup).await {
            Ok(Ok(turns)) => truncate_history(&turns, max_turns),
            Ok(Err(e)) => {
                tracing::warn!(session = %session_id, error = %e, "History store unavailable");
                warnings.push(
                    AppError::ContextAssemblyDegraded(format!("history: {}", e)).to_string(),
                );
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(session = %session_id, "History lookup timed out");
                warnings.push(
                    AppError::ContextAssemblyDegraded("history lookup timed out".into())
                        .to_string(),
                );
                Vec::new()
            }
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(ContextLimits::default())
    }
}
