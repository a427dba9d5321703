//! The four execution modes.
//!
//! Sequential and collaborative are serialized by data dependency; parallel
//! and each debate round issue their calls concurrently against the same
//! read-only bundle. Concurrent calls record their interactions as they
//! complete, so the log is in completion order.

use crate::coordination::coordinator::{AgentCall, Coordinator, ExecutionPlan, ModeOutcome, RequestScope};
use crate::memory::{estimate_tokens, truncate_to_tokens};
use crate::types::{AppError, ContextBundle, CoordinationMode, CoordinationState, Result, COORDINATOR};
use futures::future::join_all;
use tokio::sync::mpsc;

impl Coordinator {
    pub(crate) async fn execute(
        &self,
        scope: &RequestScope,
        plan: &ExecutionPlan,
        query: &str,
        context: &ContextBundle,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<ModeOutcome> {
        match plan.mode {
            CoordinationMode::Sequential => self.run_sequential(scope, plan, query, context, sink).await,
            CoordinationMode::Parallel => self.run_parallel(scope, plan, query, context, sink).await,
            CoordinationMode::Collaborative => {
                self.run_collaborative(scope, plan, query, context, sink).await
            }
            CoordinationMode::Debate => self.run_debate(scope, plan, query, context, sink).await,
        }
    }

    /// Primary, then each supporting agent; each sees the previous output.
    /// The first failure halts the chain.
    async fn run_sequential(
        &self,
        scope: &RequestScope,
        plan: &ExecutionPlan,
        query: &str,
        base: &ContextBundle,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<ModeOutcome> {
        let agents: Vec<&str> = plan.participants().collect();
        let last = agents.len() - 1;
        let mut previous: Option<(&str, String)> = None;

        for (i, agent) in agents.iter().copied().enumerate() {
            let context = match &previous {
                Some((prev_agent, output)) => {
                    base.with_section(format!("Previous output from {}", prev_agent), output.clone())
                }
                None => base.clone(),
            };
            let call = AgentCall {
                from: COORDINATOR,
                to: agent,
                query,
                context: &context,
                round: None,
            };

            let output = if i == last {
                self.transition(scope.request_id(), CoordinationState::Synthesizing);
                self.call_final(scope, call, sink).await?
            } else {
                self.call_agent(scope, call).await?
            };
            previous = Some((agent, output));
        }

        let (_, text) = previous.ok_or_else(|| AppError::Internal("empty plan".to_string()))?;
        Ok(ModeOutcome {
            text,
            degraded: false,
            warnings: Vec::new(),
        })
    }

    /// Every participant at once against the same bundle; successful answers
    /// are concatenated with a success summary. A failed primary fails the request.
    async fn run_parallel(
        &self,
        scope: &RequestScope,
        plan: &ExecutionPlan,
        query: &str,
        context: &ContextBundle,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<ModeOutcome> {
        let agents: Vec<&str> = plan.participants().collect();
        let results = join_all(agents.iter().map(|&agent| {
            self.call_agent(
                scope,
                AgentCall {
                    from: COORDINATOR,
                    to: agent,
                    query,
                    context,
                    round: None,
                },
            )
        }))
        .await;

        self.transition(scope.request_id(), CoordinationState::Synthesizing);

        let mut sections = Vec::new();
        let mut warnings = Vec::new();
        let mut primary_error = None;
        for (i, (agent, result)) in agents.iter().zip(results).enumerate() {
            match result {
                Ok(text) => sections.push(format!("## {}\n\n{}", self.display_name(agent), text)),
                Err(e) if i == 0 => primary_error = Some(e),
                Err(e) => warnings.push(e.to_string()),
            }
        }

        let succeeded = sections.len();
        let failed = agents.len() - succeeded;
        if succeeded == 0 {
            return Err(AppError::AllAgentsFailed { succeeded, failed });
        }
        // Supporting answers never stand in for the primary's
        if let Some(e) = primary_error {
            return Err(e);
        }

        let summary = if failed == 0 {
            format!("{} of {} agents responded.", succeeded, agents.len())
        } else {
            format!(
                "{} of {} agents responded; {} failed.",
                succeeded,
                agents.len(),
                failed
            )
        };
        let text = format!("{}\n\n---\n{}", sections.join("\n\n"), summary);

        if let Some(sink) = sink {
            let _ = sink.send(text.clone()).await;
        }

        Ok(ModeOutcome {
            text,
            degraded: failed > 0,
            warnings,
        })
    }

    /// Supporting agents are consulted one by one on behalf of the primary,
    /// then the primary answers once with the successful consultations.
    async fn run_collaborative(
        &self,
        scope: &RequestScope,
        plan: &ExecutionPlan,
        query: &str,
        base: &ContextBundle,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<ModeOutcome> {
        let mut context = base.clone();
        let mut warnings = Vec::new();
        let mut consulted = 0;

        for supporting in &plan.supporting {
            match self
                .consult(scope, &plan.primary, supporting, query, base)
                .await
            {
                Ok(answer) => {
                    consulted += 1;
                    context = context.with_section(
                        format!("Consultation with {}", self.display_name(supporting)),
                        answer,
                    );
                }
                Err(e) => warnings.push(e.to_string()),
            }
        }

        let failed_consultations = plan.supporting.len() - consulted;
        if failed_consultations > 0 && consulted == 0 {
            warnings.push("All consultations failed; answering from the base context".to_string());
        }

        self.transition(scope.request_id(), CoordinationState::Synthesizing);
        let call = AgentCall {
            from: COORDINATOR,
            to: &plan.primary,
            query,
            context: &context,
            round: None,
        };

        match self.call_final(scope, call, sink).await {
            Ok(text) => Ok(ModeOutcome {
                text,
                degraded: failed_consultations > 0,
                warnings,
            }),
            Err(_) if !plan.supporting.is_empty() && consulted == 0 => {
                Err(AppError::AllAgentsFailed {
                    succeeded: 0,
                    failed: plan.participant_count(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Round 1: independent answers. Later rounds: each participant reacts to
    /// the previous round. Then one synthesis call over the last round.
    async fn run_debate(
        &self,
        scope: &RequestScope,
        plan: &ExecutionPlan,
        query: &str,
        base: &ContextBundle,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<ModeOutcome> {
        let participants: Vec<&str> = plan.participants().collect();
        let rounds = self.settings().debate_rounds;
        let mut warnings = Vec::new();
        let mut degraded = false;

        let mut positions = self.debate_round(scope, &participants, query, base, 1).await;
        let failed = participants.len() - positions.len();
        if positions.is_empty() {
            return Err(AppError::AllAgentsFailed {
                succeeded: 0,
                failed,
            });
        }
        if failed > 0 {
            degraded = true;
            warnings.push(format!("{} participant(s) failed in round 1", failed));
        }

        for round in 2..=rounds {
            let context = positions_section(base, &format!("Round {} answers", round - 1), &positions);
            let prompt = format!(
                "{}\n\nRound {}: the other participants' previous answers are in the context. \
                 React to them: note agreements, challenge weak points, and refine your own position.",
                query, round
            );

            let next = self
                .debate_round(scope, &participants, &prompt, &context, round)
                .await;
            let failed = participants.len() - next.len();
            if failed > 0 {
                degraded = true;
                warnings.push(format!("{} participant(s) failed in round {}", failed, round));
            }
            if next.is_empty() {
                warnings.push(format!(
                    "No answers in round {}; synthesizing from round {}",
                    round,
                    round - 1
                ));
                break;
            }
            positions = next;
        }

        self.transition(scope.request_id(), CoordinationState::Synthesizing);
        let synthesizer = self
            .settings()
            .synthesizer
            .as_deref()
            .unwrap_or(plan.primary.as_str());
        let context = positions_section(base, "Final debate positions", &positions);
        let prompt = format!(
            "{}\n\nSynthesize the debate in the context into one final answer. \
             Resolve disagreements explicitly and state a clear recommendation.",
            query
        );
        let call = AgentCall {
            from: COORDINATOR,
            to: synthesizer,
            query: &prompt,
            context: &context,
            round: Some(rounds.saturating_add(1)),
        };
        let text = self.call_final(scope, call, sink).await?;

        Ok(ModeOutcome {
            text,
            degraded,
            warnings,
        })
    }

    /// One concurrent debate round; returns successful answers in participant order.
    async fn debate_round<'a>(
        &self,
        scope: &RequestScope,
        participants: &[&'a str],
        query: &str,
        context: &ContextBundle,
        round: u8,
    ) -> Vec<(&'a str, String)> {
        let results = join_all(participants.iter().map(|&agent| {
            self.call_agent(
                scope,
                AgentCall {
                    from: COORDINATOR,
                    to: agent,
                    query,
                    context,
                    round: Some(round),
                },
            )
        }))
        .await;

        participants
            .iter()
            .zip(results)
            .filter_map(|(&agent, result)| result.ok().map(|text| (agent, text)))
            .collect()
    }

    fn display_name<'a>(&'a self, agent: &'a str) -> &'a str {
        self.registry()
            .descriptor(agent)
            .map(|d| d.display_name.as_str())
            .unwrap_or(agent)
    }
}

/// Appends debate positions to `base`, sharing what is left of its budget.
fn positions_section(base: &ContextBundle, label: &str, positions: &[(&str, String)]) -> ContextBundle {
    let limit = base
        .remaining_tokens()
        .map(|remaining| remaining.saturating_sub(estimate_tokens(label)));
    base.with_section(label, render_positions(positions, limit))
}

/// Renders debate positions; with a token limit each position gets an equal share.
fn render_positions(positions: &[(&str, String)], limit: Option<usize>) -> String {
    let share = limit.map(|limit| limit / positions.len().max(1));
    positions
        .iter()
        .map(|(agent, text)| {
            let header = format!("[{}]\n", agent);
            let text = match share {
                Some(share) => truncate_to_tokens(text, share.saturating_sub(estimate_tokens(&header) + 1)),
                None => text.clone(),
            };
            format!("{}{}", header, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
