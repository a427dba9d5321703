//! Built-in product-management agents
//!
//! The catalog is the starting point of every registry: each entry can be
//! overridden field-by-field from `[agents.<id>]`, and configured agents that
//! are not part of the catalog are appended after it in name order.

use crate::agents::registry::AgentDescriptor;
use crate::types::{ModelTier, OutputFormat};
use crate::utils::toml_config::PilotConfig;

pub const GENERAL: &str = "general";
pub const RESEARCH: &str = "research";
pub const ANALYSIS: &str = "analysis";
pub const VALIDATION: &str = "validation";
pub const STRATEGY: &str = "strategy";
pub const IDEATION: &str = "ideation";
pub const STORY: &str = "story";
pub const INTEGRATION: &str = "integration";
pub const CODING: &str = "coding";

/// Everything needed to build one agent: its registry descriptor plus
/// the behavior of the LLM-backed unit.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub descriptor: AgentDescriptor,
    pub system_prompt: String,
    pub output_format: OutputFormat,
    /// Agents consulted through the coordinator before answering
    pub consults: Vec<String>,
    /// Explicit model name; overrides the tier binding
    pub model: Option<String>,
}

struct Builtin {
    id: &'static str,
    display_name: &'static str,
    tags: &'static [&'static str],
    tier: ModelTier,
    supporting: &'static [&'static str],
    prompt: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: GENERAL,
        display_name: "General Assistant",
        tags: &["general", "product-management"],
        tier: ModelTier::Standard,
        supporting: &[RESEARCH, ANALYSIS],
        prompt: "You are a product-management assistant. Answer the question directly, \
                 using the provided knowledge and conversation when relevant. \
                 Be concise and concrete.",
    },
    Builtin {
        id: RESEARCH,
        display_name: "Research Agent",
        tags: &["research", "market", "competitors"],
        tier: ModelTier::HighQuality,
        supporting: &[ANALYSIS, VALIDATION],
        prompt: "You are a product research specialist. Investigate markets, competitors, \
                 user needs and trends. Separate established facts from assumptions and \
                 cite the provided knowledge passages by number when you use them.",
    },
    Builtin {
        id: ANALYSIS,
        display_name: "Analysis Agent",
        tags: &["analysis", "metrics", "data"],
        tier: ModelTier::Standard,
        supporting: &[RESEARCH, VALIDATION],
        prompt: "You are a product analyst. Break problems into measurable parts, \
                 reason about metrics and data, and state the quantitative evidence \
                 behind every conclusion.",
    },
    Builtin {
        id: VALIDATION,
        display_name: "Validation Agent",
        tags: &["validation", "risk", "assumptions"],
        tier: ModelTier::Fast,
        supporting: &[RESEARCH, ANALYSIS],
        prompt: "You are a critical reviewer. Identify risky assumptions, missing evidence \
                 and feasibility problems, and propose the cheapest experiment that would \
                 validate each one.",
    },
    Builtin {
        id: STRATEGY,
        display_name: "Strategy Agent",
        tags: &["strategy", "roadmap", "prioritization"],
        tier: ModelTier::HighQuality,
        supporting: &[RESEARCH, ANALYSIS, VALIDATION],
        prompt: "You are a product strategist. Turn goals and constraints into positioning, \
                 priorities and roadmap decisions. Make trade-offs explicit.",
    },
    Builtin {
        id: IDEATION,
        display_name: "Ideation Agent",
        tags: &["ideation", "brainstorming", "features"],
        tier: ModelTier::Standard,
        supporting: &[RESEARCH, STRATEGY],
        prompt: "You are a creative product ideation partner. Generate varied, concrete \
                 ideas, group them by theme, and flag which ones are quick wins.",
    },
    Builtin {
        id: STORY,
        display_name: "Story Writer",
        tags: &["authoring", "prd", "user-stories"],
        tier: ModelTier::Standard,
        supporting: &[STRATEGY, VALIDATION],
        prompt: "You write product documents: PRDs, epics and user stories with \
                 acceptance criteria. Use clear headings and testable criteria.",
    },
    Builtin {
        id: INTEGRATION,
        display_name: "Integration Agent",
        tags: &["integration", "tooling", "workflow"],
        tier: ModelTier::Fast,
        supporting: &[CODING, ANALYSIS],
        prompt: "You are an integration specialist. Explain how product tooling, APIs and \
                 third-party services connect, and describe data flows and failure modes.",
    },
    Builtin {
        id: CODING,
        display_name: "Technical Agent",
        tags: &["coding", "technical", "debugging"],
        tier: ModelTier::Standard,
        supporting: &[INTEGRATION, VALIDATION],
        prompt: "You are a senior software engineer. Debug, review and explain code. \
                 Show corrected code in fenced blocks and explain the root cause.",
    },
];

/// Ids of the built-in agents in registration order.
pub fn builtin_ids() -> Vec<&'static str> {
    BUILTINS.iter().map(|b| b.id).collect()
}

/// The built-in agents without any configuration applied.
pub fn builtin_definitions() -> Vec<AgentDefinition> {
    BUILTINS
        .iter()
        .map(|b| AgentDefinition {
            descriptor: AgentDescriptor {
                id: b.id.to_string(),
                display_name: b.display_name.to_string(),
                capability_tags: b.tags.iter().map(|t| t.to_string()).collect(),
                model_tier: b.tier,
                default_supporting: b.supporting.iter().map(|s| s.to_string()).collect(),
            },
            system_prompt: b.prompt.to_string(),
            output_format: OutputFormat::Text,
            consults: Vec::new(),
            model: None,
        })
        .collect()
}

/// Applies `[agents.*]` to the catalog.
///
/// Built-ins keep their position; new agents follow in name order.
pub fn resolve_definitions(config: &PilotConfig) -> Vec<AgentDefinition> {
    let mut definitions = builtin_definitions();

    for (id, agent_config) in &config.agents {
        let index = match definitions.iter().position(|d| &d.descriptor.id == id) {
            Some(index) => index,
            None => {
                definitions.push(AgentDefinition {
                    descriptor: AgentDescriptor {
                        id: id.clone(),
                        display_name: id.clone(),
                        capability_tags: Default::default(),
                        model_tier: ModelTier::Standard,
                        default_supporting: Vec::new(),
                    },
                    system_prompt: format!("You are the {} agent of a product team.", id),
                    output_format: OutputFormat::Text,
                    consults: Vec::new(),
                    model: None,
                });
                definitions.len() - 1
            }
        };

        let definition = &mut definitions[index];
        if let Some(name) = &agent_config.display_name {
            definition.descriptor.display_name = name.clone();
        }
        if let Some(tier) = agent_config.tier {
            definition.descriptor.model_tier = tier;
        }
        if let Some(tags) = &agent_config.capability_tags {
            definition.descriptor.capability_tags = tags.iter().cloned().collect();
        }
        if let Some(supporting) = &agent_config.supporting {
            definition.descriptor.default_supporting = supporting.clone();
        }
        if let Some(prompt) = &agent_config.system_prompt {
            definition.system_prompt = prompt.clone();
        }
        if let Some(format) = agent_config.output_format {
            definition.output_format = format;
        }
        if let Some(consults) = &agent_config.consults {
            definition.consults = consults.clone();
        }
        if agent_config.model.is_some() {
            definition.model = agent_config.model.clone();
        }
    }

    definitions
}
