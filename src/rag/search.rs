//! Lexical scoring for the in-process knowledge provider.
//!
//! Okapi BM25 over lowercase alphanumeric terms. Only
//! [`StaticKnowledgeProvider`](super::StaticKnowledgeProvider) uses it; the
//! coordinator never sees how passages are scored.

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Term statistics for one indexed document
#[derive(Debug, Default)]
struct DocTerms {
    frequencies: HashMap<String, usize>,
    length: usize,
}

/// BM25 index keyed by document id
#[derive(Debug, Default)]
pub struct LexicalIndex {
    docs: HashMap<String, DocTerms>,
    /// Term -> number of documents containing it
    doc_freq: HashMap<String, usize>,
    total_terms: usize,
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `text` under `id`, replacing any previous version.
    pub fn insert(&mut self, id: &str, text: &str) {
        self.remove(id);

        let mut doc = DocTerms::default();
        for term in terms(text) {
            *doc.frequencies.entry(term).or_insert(0) += 1;
            doc.length += 1;
        }
        for term in doc.frequencies.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_terms += doc.length;
        self.docs.insert(id.to_string(), doc);
    }

    pub fn remove(&mut self, id: &str) {
        let Some(doc) = self.docs.remove(id) else {
            return;
        };
        for term in doc.frequencies.keys() {
            if let Some(df) = self.doc_freq.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        self.total_terms -= doc.length;
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        if df == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores every document sharing at least one term with `query`.
    ///
    /// Unordered; the caller ranks and truncates.
    pub fn score(&self, query: &str) -> Vec<(String, f32)> {
        let mut query_terms: Vec<String> = terms(query).collect();
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let avg_len = self.total_terms as f32 / self.docs.len() as f32;
        let weights: Vec<(&str, f32)> = query_terms
            .iter()
            .map(|t| (t.as_str(), self.idf(t)))
            .filter(|(_, idf)| *idf > 0.0)
            .collect();

        self.docs
            .iter()
            .filter_map(|(id, doc)| {
                let norm = K1 * (1.0 - B + B * doc.length as f32 / avg_len.max(1.0));
                let score: f32 = weights
                    .iter()
                    .filter_map(|(term, idf)| {
                        let tf = *doc.frequencies.get(*term)? as f32;
                        Some(idf * tf * (K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
