//! Memory management module for conversation history and context assembly.
//!
//! This module provides utilities for:
//! - Estimating token usage of context parts
//! - Managing conversation history windows
//! - Loading recent turns from a [`HistoryStore`]
//! - Assembling the bounded [`ContextBundle`](crate::types::ContextBundle)
//!   for every agent call (see [`context_manager::ContextAssembler`])

pub mod context_manager;

pub use context_manager::{AssembledContext, ContextAssembler, ContextLimits};

use crate::types::{KnowledgePassage, Message, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Default number of recent turns to include in context.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Default number of knowledge passages requested from retrieval.
pub const DEFAULT_TOP_K: usize = 5;

/// Default total context budget in estimated tokens.
pub const DEFAULT_CONTEXT_BUDGET: usize = 3000;

/// Read-only source of recent conversation turns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns up to `max_turns` most recent turns in chronological order.
    async fn load_recent(
        &self,
        scope_id: &str,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<Message>>;
}

/// History store backed by a map, keyed by `(scope_id, session_id)`.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    sessions: RwLock<HashMap<(String, String), Vec<Message>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn to a session.
    pub fn push(&self, scope_id: &str, session_id: &str, message: Message) {
        self.sessions
            .write()
            .entry((scope_id.to_string(), session_id.to_string()))
            .or_default()
            .push(message);
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load_recent(
        &self,
        scope_id: &str,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<Message>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .get(&(scope_id.to_string(), session_id.to_string()))
            .map(|history| truncate_history(history, max_turns))
            .unwrap_or_default())
    }
}

/// Truncates conversation history to a window of recent messages.
///
/// # Arguments
/// * `history` - Full conversation history
/// * `window_size` - Maximum number of messages to keep
///
/// # Returns
/// A new vector containing only the most recent messages, in chronological order.
pub fn truncate_history(history: &[Message], window_size: usize) -> Vec<Message> {
    if history.len() <= window_size {
        history.to_vec()
    } else {
        history[history.len() - window_size..].to_vec()
    }
}

/// Estimates token count for a piece of text (rough approximation).
///
/// Uses a simple heuristic of ~4 characters per token for English text.
/// This is an approximation and may vary by tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Appended to text cut by [`truncate_to_tokens`].
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Cuts `text` so that [`estimate_tokens`] of the result is at most `max_tokens`.
///
/// The cut lands on a char boundary and is marked with [`TRUNCATION_MARKER`]
/// when the marker itself fits.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let marker = if max_bytes > TRUNCATION_MARKER.len() {
        TRUNCATION_MARKER
    } else {
        ""
    };
    let mut cut = max_bytes - marker.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], marker)
}

/// Estimated tokens for one history turn, including its role label.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(message.role.as_str()) + estimate_tokens(&message.content)
}

/// Estimated tokens for one metadata entry.
pub fn estimate_metadata_tokens(key: &str, value: &str) -> usize {
    estimate_tokens(key) + estimate_tokens(value)
}

/// Estimated size of the assembled parts of a context bundle.
pub fn estimate_bundle_tokens(
    knowledge: &[KnowledgePassage],
    history: &[Message],
    metadata: &BTreeMap<String, String>,
) -> usize {
    let knowledge: usize = knowledge.iter().map(|p| estimate_tokens(&p.text)).sum();
    let history: usize = history.iter().map(estimate_message_tokens).sum();
    let metadata: usize = metadata
        .iter()
        .map(|(k, v)| estimate_metadata_tokens(k, v))
        .sum();
    knowledge + history + metadata
}
