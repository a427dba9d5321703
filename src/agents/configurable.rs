//! Configurable Agent implementation
//!
//! A generic LLM-backed agent unit whose behavior comes entirely from an
//! [`AgentDefinition`]: a fixed system prompt, an output format, and an
//! optional list of agents to consult before answering.

use crate::agents::catalog::AgentDefinition;
use crate::agents::registry::AgentDescriptor;
use crate::agents::{Agent, Consult};
use crate::llm::{LLMClient, TextStream};
use crate::types::{AppError, ContextBundle, OutputFormat, Result};
use async_trait::async_trait;

/// An agent that derives its behavior from configuration
pub struct ConfigurableAgent {
    definition: AgentDefinition,
    llm: Box<dyn LLMClient>,
}

impl ConfigurableAgent {
    pub fn new(definition: AgentDefinition, llm: Box<dyn LLMClient>) -> Self {
        Self { definition, llm }
    }

    pub fn system_prompt(&self) -> &str {
        &self.definition.system_prompt
    }

    pub fn output_format(&self) -> OutputFormat {
        self.definition.output_format
    }

    pub fn consults(&self) -> &[String] {
        &self.definition.consults
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Runs configured consultations and folds successful answers into the context.
    ///
    /// Failed consultations are skipped; the coordinator has already logged them.
    async fn enrich_context(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> ContextBundle {
        let mut enriched = context.clone();
        for target in &self.definition.consults {
            match consult.consult(target, query, context).await {
                Ok(answer) => {
                    enriched = enriched.with_section(format!("Input from {}", target), answer);
                }
                Err(e) => {
                    tracing::debug!(agent = %self.id(), target = %target, error = %e, "Consultation skipped");
                }
            }
        }
        enriched
    }

    fn build_prompt(&self, query: &str, context: &ContextBundle) -> String {
        let mut prompt = String::new();
        let rendered = context.render();
        if !rendered.is_empty() {
            prompt.push_str(&rendered);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Query: ");
        prompt.push_str(query);
        if self.definition.output_format == OutputFormat::Json {
            prompt.push_str("\n\nRespond with a single valid JSON document and nothing else.");
        }
        prompt
    }

    fn call_failed(&self, e: AppError) -> AppError {
        e.into_agent_call_failed(self.id())
    }
}

/// Strips a surrounding Markdown code fence, if any.
pub fn unwrap_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Checks that an agent's output is a JSON document, returning the unwrapped JSON.
pub fn validate_json_output(agent: &str, text: &str) -> Result<String> {
    let candidate = unwrap_code_fence(text);
    serde_json::from_str::<serde_json::Value>(candidate).map_err(|e| AppError::MalformedOutput {
        agent: agent.to_string(),
        reason: e.to_string(),
    })?;
    Ok(candidate.to_string())
}

#[async_trait]
impl Agent for ConfigurableAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.definition.descriptor
    }

    async fn respond(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> Result<String> {
        let context = self.enrich_context(query, context, consult).await;
        let prompt = self.build_prompt(query, &context);

        let output = self
            .llm
            .generate_with_system(&self.definition.system_prompt, &prompt)
            .await
            .map_err(|e| self.call_failed(e))?;

        match self.definition.output_format {
            OutputFormat::Text => Ok(output),
            OutputFormat::Json => validate_json_output(self.id(), &output),
        }
    }

    async fn respond_stream(
        &self,
        query: &str,
        context: &ContextBundle,
        consult: &dyn Consult,
    ) -> Result<TextStream> {
        // Structured output must be validated as a whole before anything is emitted
        if self.definition.output_format == OutputFormat::Json {
            let text = self.respond(query, context, consult).await?;
            return Ok(Box::new(futures::stream::iter(vec![Ok(text)])));
        }

        let context = self.enrich_context(query, context, consult).await;
        let prompt = self.build_prompt(query, &context);

        self.llm
            .stream_with_system(&self.definition.system_prompt, &prompt)
            .await
            .map_err(|e| self.call_failed(e))
    }
}
