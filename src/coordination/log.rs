//! Interaction log
//!
//! An append-only record of every agent invocation. The process-wide
//! [`InteractionLog`] accepts concurrent appends from many requests; each
//! append is a single locked push, so records never interleave. A
//! [`RequestLog`] is the per-request view the coordinator writes through.

use crate::types::{AgentInteraction, AppError, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

/// Append-only log shared across requests
#[derive(Default)]
pub struct InteractionLog {
    entries: Mutex<Vec<AgentInteraction>>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, interaction: AgentInteraction) {
        self.entries.lock().push(interaction);
    }

    /// Snapshot of every record in append order
    pub fn entries(&self) -> Vec<AgentInteraction> {
        self.entries.lock().clone()
    }

    /// Records of one request in append order
    pub fn for_request(&self, request_id: Uuid) -> Vec<AgentInteraction> {
        self.entries
            .lock()
            .iter()
            .filter(|i| i.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Writes every record as one JSON object per line
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<()> {
        for entry in self.entries().iter() {
            let line = serde_json::to_string(entry)
                .map_err(|e| AppError::Internal(format!("Failed to serialize interaction: {}", e)))?;
            writeln!(writer, "{}", line)
                .map_err(|e| AppError::Internal(format!("Failed to write interaction log: {}", e)))?;
        }
        Ok(())
    }
}

/// Per-request view of the interaction log.
///
/// Once closed (timeout or cancellation) further records are discarded.
pub struct RequestLog {
    request_id: Uuid,
    shared: Arc<InteractionLog>,
    state: Mutex<RequestLogState>,
}

#[derive(Default)]
struct RequestLogState {
    entries: Vec<AgentInteraction>,
    closed: bool,
}

impl RequestLog {
    pub fn new(request_id: Uuid, shared: Arc<InteractionLog>) -> Self {
        Self {
            request_id,
            shared,
            state: Mutex::new(RequestLogState::default()),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Appends to both the request view and the shared log.
    ///
    /// Returns false if the log was already closed.
    pub fn record(&self, interaction: AgentInteraction) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!(to = %interaction.to_agent, "Discarding interaction after request closed");
            return false;
        }
        self.shared.append(interaction.clone());
        state.entries.push(interaction);
        true
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn snapshot(&self) -> Vec<AgentInteraction> {
        self.state.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
