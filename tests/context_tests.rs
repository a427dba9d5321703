//! Context assembly tests with mocked retrieval and history collaborators.

mod common;

use async_trait::async_trait;
use common::mocks::{FailingHistoryStore, FailingKnowledgeProvider};
use mockall::mock;
use prodpilot::memory::{estimate_tokens, ContextAssembler, ContextLimits, InMemoryHistoryStore};
use prodpilot::rag::KnowledgeProvider;
use prodpilot::types::{AppError, CoordinationRequest, KnowledgePassage, Message, MessageRole, Result};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Knowledge {}

    #[async_trait]
    impl KnowledgeProvider for Knowledge {
        async fn search(&self, query: &str, scope_id: &str, top_k: usize) -> Result<Vec<KnowledgePassage>>;
    }
}

fn limits(top_k: usize, max_history_turns: usize, budget_tokens: usize) -> ContextLimits {
    ContextLimits {
        top_k,
        max_history_turns,
        budget_tokens,
        lookup_timeout: Duration::from_secs(5),
    }
}

fn history(turns: usize) -> Vec<Message> {
    (0..turns)
        .map(|i| {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            Message::new(role, format!("turn {} {}", i, "x".repeat(40)))
        })
        .collect()
}

fn passages(scores: &[f32]) -> Vec<KnowledgePassage> {
    scores
        .iter()
        .map(|&s| KnowledgePassage::new(format!("passage scored {} {}", s, "k".repeat(60)), s))
        .collect()
}

#[tokio::test]
async fn test_retrieval_failure_keeps_history() {
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .times(1)
        .returning(|_, _, _| Err(AppError::Internal("vector store down".to_string())));

    let assembler = ContextAssembler::new(ContextLimits::default()).with_knowledge(Arc::new(knowledge));
    let request = CoordinationRequest::new("what changed last sprint").with_history(history(4));

    let assembled = assembler.assemble(&request).await;

    assert!(assembled.bundle.retrieved_knowledge.is_empty());
    assert_eq!(assembled.bundle.history_window.len(), 4);
    assert_eq!(assembled.warnings.len(), 1);
    assert!(assembled.warnings[0].contains("vector store down"));
}

#[tokio::test]
async fn test_search_uses_default_scope_and_top_k() {
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .withf(|_, scope, top_k| scope.contains("default") && *top_k == 3)
        .times(1)
        .returning(|_, _, _| Ok(passages(&[0.9, 0.4])));

    let assembler = ContextAssembler::new(limits(3, 10, 3000)).with_knowledge(Arc::new(knowledge));
    let assembled = assembler.assemble(&CoordinationRequest::new("pricing")).await;

    assert_eq!(assembled.bundle.retrieved_knowledge.len(), 2);
    assert!(assembled.warnings.is_empty());
}

#[tokio::test]
async fn test_search_uses_request_scope() {
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .withf(|_, scope, _| scope.contains("acme"))
        .times(1)
        .returning(|_, _, _| Ok(Vec::new()));

    let assembler = ContextAssembler::new(ContextLimits::default()).with_knowledge(Arc::new(knowledge));
    assembler
        .assemble(&CoordinationRequest::new("pricing").with_scope("acme"))
        .await;
}

#[tokio::test]
async fn test_passages_are_ranked_and_capped() {
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .returning(|_, _, _| Ok(passages(&[0.2, 0.9, 0.5, 0.7])));

    let assembler = ContextAssembler::new(limits(3, 10, 3000)).with_knowledge(Arc::new(knowledge));
    let assembled = assembler.assemble(&CoordinationRequest::new("q")).await;

    let scores: Vec<f32> = assembled
        .bundle
        .retrieved_knowledge
        .iter()
        .map(|p| p.score)
        .collect();
    assert_eq!(scores, vec![0.9, 0.7, 0.5]);
}

#[rstest]
#[case(0, 0)]
#[case(5, 2)]
#[case(50, 5)]
#[case(400, 5)]
#[tokio::test]
async fn test_bundle_never_exceeds_budget(#[case] turns: usize, #[case] top_k: usize) {
    let budget = 200;
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .returning(|_, _, k| Ok(passages(&vec![0.5; k])));

    let assembler = ContextAssembler::new(limits(top_k, 500, budget)).with_knowledge(Arc::new(knowledge));
    let query = "summarize the quarter";
    let request = CoordinationRequest::new(query)
        .with_history(history(turns))
        .with_metadata("product", "prodpilot");

    let assembled = assembler.assemble(&request).await;

    assert!(assembled.bundle.estimated_tokens() + estimate_tokens(query) <= budget);
}

#[tokio::test]
async fn test_eviction_drops_lowest_relevance_knowledge_before_history() {
    let mut knowledge = MockKnowledge::new();
    knowledge
        .expect_search()
        .returning(|_, _, _| Ok(passages(&[0.1, 0.9, 0.3, 0.6, 0.8])));

    let turns = history(6);
    let history_tokens: usize = turns
        .iter()
        .map(prodpilot::memory::estimate_message_tokens)
        .sum();
    let passage_tokens = estimate_tokens(&passages(&[0.5])[0].text);
    let query = "q";
    // Room for the whole history and two passages
    let budget = history_tokens + 2 * passage_tokens + estimate_tokens(query);

    let assembler = ContextAssembler::new(limits(5, 10, budget)).with_knowledge(Arc::new(knowledge));
    let assembled = assembler
        .assemble(&CoordinationRequest::new(query).with_history(turns.clone()))
        .await;

    assert_eq!(assembled.bundle.history_window, turns);
    let kept: Vec<f32> = assembled
        .bundle
        .retrieved_knowledge
        .iter()
        .map(|p| p.score)
        .collect();
    assert_eq!(kept, vec![0.9, 0.8]);
    assert_eq!(assembled.evicted_passages, 3);
    assert_eq!(assembled.evicted_turns, 0);
}

#[tokio::test]
async fn test_oldest_history_evicted_once_knowledge_is_gone() {
    let turns = history(8);
    let last_three: usize = turns[5..]
        .iter()
        .map(prodpilot::memory::estimate_message_tokens)
        .sum();
    let assembler = ContextAssembler::new(limits(5, 10, last_three + estimate_tokens("q")))
        .with_knowledge(Arc::new(FailingKnowledgeProvider));

    let assembled = assembler
        .assemble(&CoordinationRequest::new("q").with_history(turns.clone()))
        .await;

    assert_eq!(assembled.bundle.history_window, turns[5..].to_vec());
    assert_eq!(assembled.evicted_turns, 5);
}

#[tokio::test]
async fn test_history_loaded_from_store_by_session() {
    let store = Arc::new(InMemoryHistoryStore::new());
    for turn in history(12) {
        store.push("acme", "s-1", turn);
    }
    store.push("other", "s-1", Message::new(MessageRole::User, "not mine"));

    let assembler = ContextAssembler::new(limits(5, 4, 3000)).with_history_store(store);
    let assembled = assembler
        .assemble(&CoordinationRequest::new("q").with_scope("acme").with_session("s-1"))
        .await;

    assert_eq!(assembled.bundle.history_window.len(), 4);
    assert!(assembled.bundle.history_window[3].content.starts_with("turn 11"));
}

#[tokio::test]
async fn test_request_history_takes_precedence_over_store() {
    let store = Arc::new(InMemoryHistoryStore::new());
    store.push("default", "s-1", Message::new(MessageRole::User, "from store"));

    let assembler = ContextAssembler::new(ContextLimits::default()).with_history_store(store);
    let request = CoordinationRequest::new("q")
        .with_session("s-1")
        .with_history(vec![Message::new(MessageRole::User, "from request")]);
    let assembled = assembler.assemble(&request).await;

    assert_eq!(assembled.bundle.history_window.len(), 1);
    assert_eq!(assembled.bundle.history_window[0].content, "from request");
}

#[tokio::test]
async fn test_history_store_failure_is_absorbed() {
    let assembler = ContextAssembler::new(ContextLimits::default())
        .with_history_store(Arc::new(FailingHistoryStore));
    let assembled = assembler
        .assemble(&CoordinationRequest::new("q").with_session("s-1"))
        .await;

    assert!(assembled.bundle.history_window.is_empty());
    assert!(assembled.warnings[0].contains("history unavailable"));
}

struct SlowKnowledge;

#[async_trait]
impl KnowledgeProvider for SlowKnowledge {
    async fn search(&self, _query: &str, _scope_id: &str, _top_k: usize) -> Result<Vec<KnowledgePassage>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(passages(&[1.0]))
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_retrieval_times_out() {
    let assembler = ContextAssembler::new(ContextLimits {
        lookup_timeout: Duration::from_millis(250),
        ..ContextLimits::default()
    })
    .with_knowledge(Arc::new(SlowKnowledge));

    let assembled = assembler.assemble(&CoordinationRequest::new("q")).await;

    assert!(assembled.bundle.retrieved_knowledge.is_empty());
    assert!(assembled.warnings[0].contains("timed out after 250 ms"));
}
