//! Router tests: rule priority, overrides and mode classification.

mod common;

use common::mocks::{catalog_agents, registry_of, ScriptedAgent};
use prodpilot::agents::router::{Router, RoutingRule};
use prodpilot::coordination::Coordinator;
use prodpilot::types::{CoordinationMode, CoordinationRequest};
use rstest::rstest;
use std::sync::Arc;

fn router() -> Router {
    Router::new(registry_of(catalog_agents())).expect("catalog router")
}

#[test]
fn test_debug_this_function_routes_to_coding_collaboratively() {
    let decision = router().route(&CoordinationRequest::new("debug this function"));

    assert_eq!(decision.primary, "coding");
    assert_eq!(decision.mode, CoordinationMode::Collaborative);
    assert_eq!(decision.matched_rule.as_deref(), Some("coding"));
    // Registration order, not the order in the descriptor
    assert_eq!(decision.supporting, vec!["validation", "integration"]);
}

#[rstest]
#[case("write user stories for onboarding", "story")]
#[case("what are the risks of this launch", "validation")]
#[case("research the competitor landscape", "research")]
#[case("analyze churn in the funnel", "analysis")]
#[case("build a roadmap for Q3", "strategy")]
#[case("brainstorm ideas for onboarding", "ideation")]
#[case("brainstorm ideas to improve retention", "analysis")]
#[case("set up a jira webhook", "integration")]
#[case("hello there", "general")]
fn test_builtin_rules(#[case] query: &str, #[case] expected: &str) {
    assert_eq!(router().route(&CoordinationRequest::new(query)).primary, expected);
}

#[test]
fn test_first_match_wins() {
    // Matches both the coding and research rules; coding is listed first
    let decision = router().route(&CoordinationRequest::new("research why this code fails"));
    assert_eq!(decision.primary, "coding");

    let registry = registry_of(catalog_agents());
    let reordered = vec![
        RoutingRule::any("research-first", "research", &["research"]),
        RoutingRule::any("coding", "coding", &["code"]),
    ];
    let router = Router::with_rules(registry, reordered, "general").unwrap();
    let decision = router.route(&CoordinationRequest::new("research why this code fails"));
    assert_eq!(decision.primary, "research");
    assert_eq!(decision.matched_rule.as_deref(), Some("research-first"));
}

#[test]
fn test_all_predicate_requires_every_phrase() {
    let registry = registry_of(catalog_agents());
    let rules = vec![RoutingRule::all("pricing-page", "strategy", &["pricing", "page"])];
    let router = Router::with_rules(registry, rules, "general").unwrap();

    assert_eq!(router.route(&CoordinationRequest::new("fix the pricing page")).primary, "strategy");
    assert_eq!(router.route(&CoordinationRequest::new("pricing tiers")).primary, "general");
}

#[test]
fn test_explicit_primary_is_honored() {
    let decision = router().route(&CoordinationRequest::new("debug this function").with_primary("research"));

    assert_eq!(decision.primary, "research");
    assert!(decision.matched_rule.is_none());
    assert!(decision.explicit_primary_rejected.is_none());
    assert_eq!(decision.supporting, vec!["analysis", "validation"]);
}

#[test]
fn test_unknown_primary_falls_back_to_rules() {
    let decision = router().route(&CoordinationRequest::new("debug this function").with_primary("nonexistent"));

    assert_eq!(decision.primary, "coding");
    assert_eq!(decision.explicit_primary_rejected.as_deref(), Some("nonexistent"));
    assert!(decision.warnings.iter().any(|w| w.contains("nonexistent")));
}

#[test]
fn test_explicit_supporting_is_filtered_and_ordered() {
    let request = CoordinationRequest::new("plan the launch")
        .with_primary("strategy")
        .with_supporting(["validation", "ghost", "strategy", "research", "validation"]);
    let decision = router().route(&request);

    assert_eq!(decision.supporting, vec!["research", "validation"]);
    assert!(decision.warnings.iter().any(|w| w.contains("ghost")));
}

#[test]
fn test_explicit_empty_supporting_means_none() {
    let request = CoordinationRequest::new("plan the launch")
        .with_primary("strategy")
        .with_supporting(Vec::<String>::new());
    assert!(router().route(&request).supporting.is_empty());
}

#[rstest]
#[case("pros and cons of a freemium tier", CoordinationMode::Debate)]
#[case("mobile first versus web first", CoordinationMode::Debate)]
#[case("should we sunset the legacy plan", CoordinationMode::Debate)]
#[case("give me multiple perspectives on the launch", CoordinationMode::Parallel)]
#[case("multiple perspectives: should we ship now", CoordinationMode::Debate)]
#[case("summarize last sprint", CoordinationMode::Collaborative)]
fn test_mode_classification(#[case] query: &str, #[case] expected: CoordinationMode) {
    assert_eq!(router().classify_mode(query), expected);
}

#[test]
fn test_explicit_mode_wins_over_wording() {
    let request = CoordinationRequest::new("pros and cons of a freemium tier")
        .with_mode(CoordinationMode::Sequential);
    assert_eq!(router().route(&request).mode, CoordinationMode::Sequential);
}

#[test]
fn test_default_mode_is_configurable() {
    let router = router().with_default_mode(CoordinationMode::Parallel);
    assert_eq!(router.classify_mode("summarize last sprint"), CoordinationMode::Parallel);
}

#[test]
fn test_routing_is_idempotent() {
    let router = router();
    let request = CoordinationRequest::new("compare options for the analytics stack: should we build or buy")
        .with_supporting(["research", "ghost", "analysis"]);

    let first = router.route(&request);
    for _ in 0..10 {
        assert_eq!(router.route(&request), first);
    }
}

#[test]
fn test_rules_must_target_registered_agents() {
    let registry = registry_of(catalog_agents());
    let rules = vec![RoutingRule::any("bad", "nobody", &["x"])];
    assert!(Router::with_rules(Arc::clone(&registry), rules, "general").is_err());
    assert!(Router::with_rules(registry, Vec::new(), "nobody").is_err());
}

#[test]
fn test_registry_without_general_defaults_to_first_agent() {
    let registry = registry_of(vec![
        ScriptedAgent::new("research"),
        ScriptedAgent::new("analysis"),
    ]);
    let router = Router::new(Arc::clone(&registry)).unwrap();

    let decision = router.route(&CoordinationRequest::new("hello there"));
    assert_eq!(decision.primary, "research");
    assert!(decision.matched_rule.is_none());

    // Built-in rules for registered agents still apply
    let decision = router.route(&CoordinationRequest::new("analyze churn in the funnel"));
    assert_eq!(decision.primary, "analysis");

    assert!(Coordinator::builder(registry).build().is_ok());
}
