//! Rule-based query router
//!
//! Selection is a pure function of the request and the rule table: an ordered
//! list of `(predicate, agent)` pairs evaluated top to bottom, first match wins.
//! The same request always yields the same decision.

use crate::agents::catalog;
use crate::agents::registry::AgentRegistry;
use crate::types::{AppError, CoordinationMode, CoordinationRequest, Result};
use crate::utils::toml_config::{PilotConfig, RoutingRuleConfig};
use serde::Serialize;
use std::sync::Arc;

const DEBATE_PHRASES: &[&str] = &[
    "pros and cons",
    "versus",
    "vs",
    "trade-off",
    "tradeoff",
    "which is better",
    "should we",
    "or should",
    "debate",
    "compare options",
];

const PARALLEL_PHRASES: &[&str] = &[
    "multiple perspectives",
    "different perspectives",
    "several perspectives",
    "from every angle",
    "all perspectives",
    "each agent",
    "in parallel",
];

/// Keyword predicate of a routing rule. Phrases are matched on word tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "match", content = "phrases", rename_all = "lowercase")]
pub enum RuleMatch {
    /// At least one phrase occurs
    Any(Vec<String>),
    /// Every phrase occurs
    All(Vec<String>),
}

impl RuleMatch {
    fn matches(&self, tokens: &[String]) -> bool {
        match self {
            RuleMatch::Any(phrases) => phrases.iter().any(|p| contains_phrase(tokens, p)),
            RuleMatch::All(phrases) => {
                !phrases.is_empty() && phrases.iter().all(|p| contains_phrase(tokens, p))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRule {
    pub name: String,
    pub predicate: RuleMatch,
    pub agent: String,
}

impl RoutingRule {
    pub fn any(name: &str, agent: &str, phrases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            predicate: RuleMatch::Any(phrases.iter().map(|p| p.to_string()).collect()),
            agent: agent.to_string(),
        }
    }

    pub fn all(name: &str, agent: &str, phrases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            predicate: RuleMatch::All(phrases.iter().map(|p| p.to_string()).collect()),
            agent: agent.to_string(),
        }
    }

    fn from_config(rule: &RoutingRuleConfig) -> Self {
        let predicate = if rule.all.is_empty() {
            RuleMatch::Any(rule.any.clone())
        } else {
            RuleMatch::All(rule.all.clone())
        };
        Self {
            name: rule.name.clone(),
            predicate,
            agent: rule.agent.clone(),
        }
    }
}

/// The built-in rule table. Order is priority.
pub fn default_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule::any(
            "coding",
            catalog::CODING,
            &[
                "debug", "bug", "bugs", "code", "function", "compile", "stack trace",
                "refactor", "exception", "unit test",
            ],
        ),
        RoutingRule::any(
            "authoring",
            catalog::STORY,
            &[
                "prd", "user story", "user stories", "acceptance criteria", "epic",
                "requirements document", "write a spec",
            ],
        ),
        RoutingRule::any(
            "validation",
            catalog::VALIDATION,
            &[
                "validate", "validation", "risk", "risks", "assumption", "assumptions",
                "feasibility", "feasible", "verify",
            ],
        ),
        RoutingRule::any(
            "research",
            catalog::RESEARCH,
            &[
                "research", "market", "competitor", "competitors", "competitive", "trend",
                "trends", "survey", "user interviews",
            ],
        ),
        RoutingRule::any(
            "analysis",
            catalog::ANALYSIS,
            &[
                "analyze", "analyse", "analysis", "metric", "metrics", "kpi", "kpis", "churn",
                "funnel", "retention", "data",
            ],
        ),
        RoutingRule::any(
            "strategy",
            catalog::STRATEGY,
            &[
                "strategy", "roadmap", "prioritize", "prioritise", "prioritization",
                "positioning", "go-to-market", "vision", "okr", "okrs",
            ],
        ),
        RoutingRule::any(
            "ideation",
            catalog::IDEATION,
            &["brainstorm", "idea", "ideas", "ideate", "concept", "concepts"],
        ),
        RoutingRule::any(
            "integration",
            catalog::INTEGRATION,
            &[
                "integrate", "integration", "integrations", "webhook", "webhooks", "connector",
                "jira", "slack", "sync",
            ],
        ),
    ]
}

/// Lower-cases and splits text into word tokens (alphanumeric, `-`, `'`).
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// True when the phrase's tokens occur consecutively in `tokens`.
fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub primary: String,
    /// Registration order, never containing the primary
    pub supporting: Vec<String>,
    pub mode: CoordinationMode,
    /// Name of the rule that selected the primary, if any
    pub matched_rule: Option<String>,
    /// The caller's explicit primary, when it was unknown and ignored
    pub explicit_primary_rejected: Option<String>,
    pub warnings: Vec<String>,
}

/// Selects the primary agent, supporting agents and coordination mode
pub struct Router {
    registry: Arc<AgentRegistry>,
    rules: Vec<RoutingRule>,
    default_agent: String,
    default_mode: CoordinationMode,
    debate_phrases: Vec<String>,
    parallel_phrases: Vec<String>,
}

impl Router {
    /// Router with the built-in rule table and defaults.
    ///
    /// Built-in rules whose agent is not registered are skipped. Unmatched
    /// queries go to the general agent, or to the first registered agent when
    /// there is no general agent.
    pub fn new(registry: Arc<AgentRegistry>) -> Result<Self> {
        let default_agent = if registry.contains(catalog::GENERAL) {
            catalog::GENERAL.to_string()
        } else {
            registry
                .ids()
                .next()
                .map(str::to_string)
                .ok_or_else(|| AppError::Configuration("No agents are registered".to_string()))?
        };

        let rules = default_rules()
            .into_iter()
            .filter(|rule| {
                let registered = registry.contains(&rule.agent);
                if !registered {
                    tracing::debug!(rule = %rule.name, agent = %rule.agent, "Skipping built-in rule for unregistered agent");
                }
                registered
            })
            .collect();
        Self::with_rules(registry, rules, &default_agent)
    }

    /// Router with a custom rule table
    ///
    /// Every rule agent and the default agent must be registered.
    pub fn with_rules(
        registry: Arc<AgentRegistry>,
        rules: Vec<RoutingRule>,
        default_agent: &str,
    ) -> Result<Self> {
        if !registry.contains(default_agent) {
            return Err(AppError::Configuration(format!(
                "Default agent '{}' is not registered",
                default_agent
            )));
        }
        for rule in &rules {
            if !registry.contains(&rule.agent) {
                return Err(AppError::Configuration(format!(
                    "Routing rule '{}' targets unregistered agent '{}'",
                    rule.name, rule.agent
                )));
            }
        }

        Ok(Self {
            registry,
            rules,
            default_agent: default_agent.to_string(),
            default_mode: CoordinationMode::default(),
            debate_phrases: DEBATE_PHRASES.iter().map(|p| p.to_string()).collect(),
            parallel_phrases: PARALLEL_PHRASES.iter().map(|p| p.to_string()).collect(),
        })
    }

    /// Router configured from `[routing]` and `[coordination]`
    pub fn from_config(registry: Arc<AgentRegistry>, config: &PilotConfig) -> Result<Self> {
        let rules = if config.routing.rules.is_empty() {
            default_rules()
        } else {
            config
                .routing
                .rules
                .iter()
                .map(RoutingRule::from_config)
                .collect()
        };

        let mut router = Self::with_rules(registry, rules, &config.coordination.default_agent)?
            .with_default_mode(config.coordination.default_mode);
        if let Some(phrases) = &config.routing.debate_phrases {
            router.debate_phrases = phrases.clone();
        }
        if let Some(phrases) = &config.routing.parallel_phrases {
            router.parallel_phrases = phrases.clone();
        }
        Ok(router)
    }

    pub fn with_default_mode(mut self, mode: CoordinationMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// First rule whose predicate matches the query
    pub fn classify(&self, query: &str) -> Option<&RoutingRule> {
        let tokens = tokenize(query);
        self.rules.iter().find(|rule| rule.predicate.matches(&tokens))
    }

    /// Mode implied by the query wording; debate language wins over parallel.
    pub fn classify_mode(&self, query: &str) -> CoordinationMode {
        let tokens = tokenize(query);
        if self.debate_phrases.iter().any(|p| contains_phrase(&tokens, p)) {
            CoordinationMode::Debate
        } else if self.parallel_phrases.iter().any(|p| contains_phrase(&tokens, p)) {
            CoordinationMode::Parallel
        } else {
            self.default_mode
        }
    }

    pub fn route(&self, request: &CoordinationRequest) -> RoutingDecision {
        self.select(
            &request.query,
            request.explicit_primary_agent.as_deref(),
            request.explicit_supporting_agents.as_deref(),
            request.mode,
        )
    }

    /// Routes a query with optional caller overrides.
    pub fn select(
        &self,
        query: &str,
        explicit_primary: Option<&str>,
        explicit_supporting: Option<&[String]>,
        mode: Option<CoordinationMode>,
    ) -> RoutingDecision {
        let mut warnings = Vec::new();
        let mut rejected = None;
        let mut matched_rule = None;

        let primary = match explicit_primary {
            Some(id) if self.registry.contains(id) => id.to_string(),
            other => {
                if let Some(id) = other {
                    tracing::warn!(agent = %id, "Unknown explicit primary agent, falling back to routing rules");
                    warnings.push(AppError::UnknownAgent(id.to_string()).to_string());
                    rejected = Some(id.to_string());
                }
                match self.classify(query) {
                    Some(rule) => {
                        matched_rule = Some(rule.name.clone());
                        rule.agent.clone()
                    }
                    None => self.default_agent.clone(),
                }
            }
        };

        let requested: Vec<String> = match explicit_supporting {
            Some(ids) => ids.to_vec(),
            None => self
                .registry
                .descriptor(&primary)
                .map(|d| d.default_supporting.clone())
                .unwrap_or_default(),
        };

        let mut supporting = Vec::with_capacity(requested.len());
        for id in requested {
            if id == primary || supporting.contains(&id) {
                continue;
            }
            if !self.registry.contains(&id) {
                tracing::warn!(agent = %id, "Dropping unknown supporting agent");
                warnings.push(format!("Unknown supporting agent '{}' ignored", id));
                continue;
            }
            supporting.push(id);
        }
        self.registry.sort_by_registration(&mut supporting);

        let mode = mode.unwrap_or_else(|| self.classify_mode(query));

        tracing::debug!(
            primary = %primary,
            supporting = ?supporting,
            mode = %mode,
            rule = ?matched_rule,
            "Routed request"
        );

        RoutingDecision {
            primary,
            supporting,
            mode,
            matched_rule,
            explicit_primary_rejected: rejected,
            warnings,
        }
    }
}
