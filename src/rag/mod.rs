//! Retrieval collaborator interface.
//!
//! The coordination engine consumes retrieved knowledge through the
//! [`KnowledgeProvider`] trait and never depends on how documents are stored
//! or embedded. [`StaticKnowledgeProvider`] is an in-process implementation
//! backed by a per-scope BM25 index, used by the CLI and by tests.
//!
//! # Contract
//!
//! - `search(query, scope_id, top_k)` returns passages with a relevance score
//! - Results must be deterministic for an identical index state
//! - Errors are absorbed by the context assembler (no knowledge, request continues)

pub mod search;

use crate::types::{KnowledgePassage, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use search::LexicalIndex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Source of product-scoped knowledge passages.
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Search passages relevant to `query` within `scope_id`.
    async fn search(
        &self,
        query: &str,
        scope_id: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgePassage>>;
}

/// Ranking used for retrieved passages: score descending, ties broken by most recent.
pub fn rank_passages(passages: &mut [KnowledgePassage]) {
    passages.sort_by(compare_passages);
}

fn compare_passages(a: &KnowledgePassage, b: &KnowledgePassage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// A document stored by [`StaticKnowledgeProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub scope_id: String,
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ScopeIndex {
    index: LexicalIndex,
    documents: HashMap<String, KnowledgeDocument>,
}

/// In-process knowledge provider with one BM25 index per scope.
#[derive(Default)]
pub struct StaticKnowledgeProvider {
    scopes: RwLock<HashMap<String, ScopeIndex>>,
}

impl StaticKnowledgeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a provider from a list of documents.
    pub fn from_documents(documents: impl IntoIterator<Item = KnowledgeDocument>) -> Self {
        let provider = Self::new();
        for doc in documents {
            provider.add_document(doc);
        }
        provider
    }

    /// Adds or replaces a document.
    pub fn add_document(&self, document: KnowledgeDocument) {
        let mut scopes = self.scopes.write();
        let scope = scopes.entry(document.scope_id.clone()).or_default();
        scope.index.insert(&document.id, &document.text);
        scope.documents.insert(document.id.clone(), document);
    }

    /// Number of documents across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.read().values().map(|s| s.documents.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeProvider for StaticKnowledgeProvider {
    async fn search(
        &self,
        query: &str,
        scope_id: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgePassage>> {
        let scopes = self.scopes.read();
        let Some(scope) = scopes.get(scope_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(&KnowledgeDocument, f32)> = scope
            .index
            .score(query)
            .into_iter()
            .filter_map(|(id, score)| scope.documents.get(&id).map(|doc| (doc, score)))
            .collect();

        // Document id is the final tie-break so identical index state gives identical output.
        scored.sort_by(|(da, sa), (db, sb)| {
            sb.total_cmp(sa)
                .then_with(|| db.updated_at.cmp(&da.updated_at))
                .then_with(|| da.id.cmp(&db.id))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(doc, score)| KnowledgePassage {
                text: doc.text.clone(),
                score,
                source: doc.source.clone().or_else(|| Some(doc.id.clone())),
                updated_at: doc.updated_at,
            })
            .collect())
    }
}
