//! The coordination engine
//!
//! A [`Coordinator`] takes one [`CoordinationRequest`] through
//! `Selecting → Executing → Synthesizing → Done | Failed`: the router picks the
//! agents and mode, the context assembler builds the shared bundle, and the
//! selected mode drives the agent calls. Every agent call (including
//! agent-to-agent consultations) goes through [`Coordinator::call_agent`], which
//! applies the per-call timeout and records exactly one interaction.

use crate::agents::{AgentRegistry, Consult, Router, RoutingDecision};
use crate::coordination::log::{InteractionLog, RequestLog};
use crate::memory::ContextAssembler;
use crate::types::{
    AgentInteraction, AppError, ContextBundle, CoordinationFailure, CoordinationMode,
    CoordinationRequest, CoordinationResult, CoordinationState, Result, COORDINATOR,
};
use crate::utils::toml_config::{CoordinationConfig, PilotConfig};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Limits applied to every coordination run
#[derive(Debug, Clone)]
pub struct CoordinationSettings {
    pub per_call_timeout: Duration,
    /// Aggregate request budget; `None` derives it from the mode's worst case
    pub request_timeout: Option<Duration>,
    pub debate_rounds: u8,
    pub debate_max_participants: usize,
    /// Debate synthesizer; defaults to the primary agent
    pub synthesizer: Option<String>,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self::from_config(&CoordinationConfig::default())
    }
}

impl CoordinationSettings {
    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self {
            per_call_timeout: Duration::from_secs(config.per_call_timeout_secs),
            request_timeout: (config.request_timeout_secs > 0)
                .then(|| Duration::from_secs(config.request_timeout_secs)),
            debate_rounds: config.debate_rounds.max(1),
            debate_max_participants: config.debate_max_participants.max(1),
            synthesizer: config.synthesizer_agent.clone(),
        }
    }
}

/// The agents and mode one request will run with
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub primary: String,
    pub supporting: Vec<String>,
    pub mode: CoordinationMode,
}

impl ExecutionPlan {
    /// Primary first, then supporting agents in registration order
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.supporting.iter().map(String::as_str))
    }

    /// Number of participants, primary included
    pub fn participant_count(&self) -> usize {
        1 + self.supporting.len()
    }
}

/// One agent invocation
#[derive(Clone, Copy)]
pub(crate) struct AgentCall<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub query: &'a str,
    pub context: &'a ContextBundle,
    pub round: Option<u8>,
}

/// Per-request state shared by every call of one coordination run
pub struct RequestScope {
    request_id: Uuid,
    mode: CoordinationMode,
    log: RequestLog,
}

impl RequestScope {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn mode(&self) -> CoordinationMode {
        self.mode
    }

    /// Interactions recorded so far, in completion order
    pub fn interactions(&self) -> Vec<AgentInteraction> {
        self.log.snapshot()
    }

    pub(crate) fn close(&self) {
        self.log.close();
    }
}

/// What a mode produced before it is turned into a [`CoordinationResult`]
pub(crate) struct ModeOutcome {
    pub text: String,
    pub degraded: bool,
    pub warnings: Vec<String>,
}

/// Time an agent call spends waiting on its own consultations.
///
/// Each consultation has its own timeout, so this time is credited back to
/// the consulting call's deadline.
#[derive(Default)]
struct ConsultClock {
    state: Mutex<ClockState>,
}

#[derive(Default)]
struct ClockState {
    spent: Duration,
    active: usize,
    since: Option<tokio::time::Instant>,
}

impl ConsultClock {
    fn start(&self) {
        let mut state = self.state.lock();
        if state.active == 0 {
            state.since = Some(tokio::time::Instant::now());
        }
        state.active += 1;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.active == 0
            && let Some(since) = state.since.take()
        {
            state.spent += since.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        let state = self.state.lock();
        state.spent + state.since.map(|since| since.elapsed()).unwrap_or_default()
    }
}

/// Consultation handle given to an agent for the duration of one call.
///
/// Agents reached through a consultation get a handle that refuses further
/// consultations, so consultation depth is one and cycles cannot form.
struct ConsultHandle<'a> {
    coordinator: &'a Coordinator,
    scope: &'a RequestScope,
    from: &'a str,
    allowed: bool,
    clock: ConsultClock,
}

impl<'a> ConsultHandle<'a> {
    fn new(coordinator: &'a Coordinator, scope: &'a RequestScope, call: &AgentCall<'a>) -> Self {
        Self {
            coordinator,
            scope,
            from: call.to,
            allowed: call.from == COORDINATOR,
            clock: ConsultClock::default(),
        }
    }
}

#[async_trait]
impl Consult for ConsultHandle<'_> {
    async fn consult(&self, target: &str, query: &str, context: &ContextBundle) -> Result<String> {
        if !self.allowed {
            let err = AppError::AgentCallFailed {
                agent: target.to_string(),
                reason: format!("nested consultation from '{}' refused", self.from),
            };
            let call = AgentCall {
                from: self.from,
                to: target,
                query,
                context,
                round: None,
            };
            self.coordinator.record(self.scope, &call, Err(&err), Duration::ZERO);
            return Err(err);
        }
        self.clock.start();
        let answer = self
            .coordinator
            .consult(self.scope, self.from, target, query, context)
            .await;
        self.clock.stop();
        answer
    }
}

/// Multi-agent coordinator
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    router: Router,
    assembler: ContextAssembler,
    log: Arc<InteractionLog>,
    settings: CoordinationSettings,
}

impl Coordinator {
    pub fn builder(registry: Arc<AgentRegistry>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(registry)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn settings(&self) -> &CoordinationSettings {
        &self.settings
    }

    /// The process-wide interaction log
    pub fn log(&self) -> &Arc<InteractionLog> {
        &self.log
    }

    /// Routing decision for a request without executing it
    pub fn route(&self, request: &CoordinationRequest) -> RoutingDecision {
        self.router.route(request)
    }

    /// Opens a request scope writing to this coordinator's log
    pub fn scope(&self, mode: CoordinationMode) -> RequestScope {
        let request_id = Uuid::new_v4();
        RequestScope {
            request_id,
            mode,
            log: RequestLog::new(request_id, Arc::clone(&self.log)),
        }
    }

    /// Runs one request to completion
    pub async fn coordinate(
        &self,
        request: CoordinationRequest,
    ) -> std::result::Result<CoordinationResult, CoordinationFailure> {
        self.run(request, CancellationToken::new(), None).await
    }

    /// Runs one request, abandoning in-flight calls when `cancel` fires
    pub async fn coordinate_with_cancel(
        &self,
        request: CoordinationRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<CoordinationResult, CoordinationFailure> {
        self.run(request, cancel, None).await
    }

    /// Runs one request, streaming the final step's text chunks into `chunks`.
    ///
    /// Intermediate calls are buffered and logged, never streamed. The sender
    /// is dropped when the run ends, which closes the channel.
    pub async fn coordinate_streaming(
        &self,
        request: CoordinationRequest,
        chunks: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> std::result::Result<CoordinationResult, CoordinationFailure> {
        self.run(request, cancel, Some(chunks)).await
    }

    /// Agent-to-agent consultation, logged as an interaction from `from` to `target`.
    ///
    /// The consulted agent cannot consult further.
    pub async fn consult(
        &self,
        scope: &RequestScope,
        from: &str,
        target: &str,
        query: &str,
        context: &ContextBundle,
    ) -> Result<String> {
        let call = AgentCall {
            from,
            to: target,
            query,
            context,
            round: None,
        };

        if from == target {
            let err = AppError::AgentCallFailed {
                agent: target.to_string(),
                reason: "an agent cannot consult itself".to_string(),
            };
            self.record(scope, &call, Err(&err), Duration::ZERO);
            return Err(err);
        }

        debug!(request_id = %scope.request_id, from = %from, to = %target, "Consultation");
        self.call_agent(scope, call).await
    }

    /// Calls one agent under the per-call timeout and records the interaction.
    pub(crate) async fn call_agent(&self, scope: &RequestScope, call: AgentCall<'_>) -> Result<String> {
        let started = Instant::now();
        let outcome = match self.registry.require(call.to) {
            Err(e) => Err(e.into_agent_call_failed(call.to)),
            Ok(agent) => {
                let handle = ConsultHandle::new(self, scope, &call);
                self.within_call_timeout(
                    call.to,
                    &handle.clock,
                    agent.respond(call.query, call.context, &handle),
                )
                .await
            }
        };

        self.record(scope, &call, outcome.as_ref().map(String::as_str), started.elapsed());
        outcome
    }

    /// Streaming variant of [`Coordinator::call_agent`] for a final step.
    ///
    /// Chunks are forwarded as they arrive; the full text is logged once the stream ends.
    pub(crate) async fn call_agent_streaming(
        &self,
        scope: &RequestScope,
        call: AgentCall<'_>,
        sink: &mpsc::Sender<String>,
    ) -> Result<String> {
        let started = Instant::now();
        let outcome = match self.registry.require(call.to) {
            Err(e) => Err(e.into_agent_call_failed(call.to)),
            Ok(agent) => {
                let handle = ConsultHandle::new(self, scope, &call);
                let streamed = async {
                    let mut stream = agent.respond_stream(call.query, call.context, &handle).await?;
                    let mut text = String::new();
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk?;
                        if chunk.is_empty() {
                            continue;
                        }
                        if sink.send(chunk.clone()).await.is_err() {
                            debug!(agent = %call.to, "Stream receiver dropped; buffering remaining output");
                        }
                        text.push_str(&chunk);
                    }
                    Ok::<_, AppError>(text)
                };
                self.within_call_timeout(call.to, &handle.clock, streamed).await
            }
        };

        self.record(scope, &call, outcome.as_ref().map(String::as_str), started.elapsed());
        outcome
    }

    /// Final step of a mode: streamed when a sink is present.
    pub(crate) async fn call_final(
        &self,
        scope: &RequestScope,
        call: AgentCall<'_>,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<String> {
        match sink {
            Some(sink) => self.call_agent_streaming(scope, call, sink).await,
            None => self.call_agent(scope, call).await,
        }
    }

    /// Runs one agent call under the per-call timeout, extended by the time
    /// the call spends in its own consultations.
    async fn within_call_timeout<F>(&self, agent: &str, clock: &ConsultClock, work: F) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        let started = tokio::time::Instant::now();
        let mut deadline = started + self.settings.per_call_timeout;
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => {
                    return result.map_err(|e| e.into_agent_call_failed(agent));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let extended = started + self.settings.per_call_timeout + clock.elapsed();
                    if extended <= tokio::time::Instant::now() {
                        return Err(self.timed_out(agent));
                    }
                    deadline = extended;
                }
            }
        }
    }

    fn timed_out(&self, agent: &str) -> AppError {
        AppError::AgentCallFailed {
            agent: agent.to_string(),
            reason: format!(
                "timed out after {} ms",
                self.settings.per_call_timeout.as_millis()
            ),
        }
    }

    fn record(
        &self,
        scope: &RequestScope,
        call: &AgentCall<'_>,
        outcome: std::result::Result<&str, &AppError>,
        elapsed: Duration,
    ) {
        let (response_text, error) = match outcome {
            Ok(text) => (text.to_string(), None),
            Err(e) => (String::new(), Some(e.to_string())),
        };

        match &error {
            None => debug!(
                request_id = %scope.request_id,
                from = %call.from,
                to = %call.to,
                round = ?call.round,
                duration_ms = elapsed.as_millis() as u64,
                "Agent call completed"
            ),
            Some(e) => warn!(
                request_id = %scope.request_id,
                from = %call.from,
                to = %call.to,
                round = ?call.round,
                error = %e,
                "Agent call failed"
            ),
        }

        scope.log.record(AgentInteraction {
            id: Uuid::new_v4(),
            request_id: scope.request_id,
            from_agent: call.from.to_string(),
            to_agent: call.to.to_string(),
            query_text: call.query.to_string(),
            response_text,
            timestamp: Utc::now(),
            mode: scope.mode,
            round: call.round,
            error,
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    pub(crate) fn transition(&self, request_id: Uuid, state: CoordinationState) {
        debug!(request_id = %request_id, state = ?state, "Coordination state");
    }

    /// Turns a routing decision into a plan, applying the debate participant cap.
    pub fn plan(&self, decision: &RoutingDecision) -> (ExecutionPlan, Vec<String>) {
        let mut warnings = Vec::new();
        let mut supporting = decision.supporting.clone();

        if decision.mode == CoordinationMode::Debate {
            let cap = self.settings.debate_max_participants.saturating_sub(1);
            if supporting.len() > cap {
                let dropped = supporting.split_off(cap);
                warnings.push(format!(
                    "Debate limited to {} participants; skipped {}",
                    self.settings.debate_max_participants,
                    dropped.join(", ")
                ));
            }
        }

        (
            ExecutionPlan {
                primary: decision.primary.clone(),
                supporting,
                mode: decision.mode,
            },
            warnings,
        )
    }

    /// Aggregate budget for one request: configured, or the worst-case cost of the mode
    /// plus the context lookup timeout.
    pub fn aggregate_timeout(&self, plan: &ExecutionPlan) -> Duration {
        if let Some(timeout) = self.settings.request_timeout {
            return timeout;
        }
        let sequential_steps = match plan.mode {
            CoordinationMode::Sequential | CoordinationMode::Collaborative => plan.participant_count() as u32,
            CoordinationMode::Parallel => 1,
            CoordinationMode::Debate => u32::from(self.settings.debate_rounds) + 1,
        };
        self.settings.per_call_timeout * sequential_steps + self.assembler.limits().lookup_timeout
    }

    async fn run(
        &self,
        request: CoordinationRequest,
        cancel: CancellationToken,
        sink: Option<mpsc::Sender<String>>,
    ) -> std::result::Result<CoordinationResult, CoordinationFailure> {
        let span = info_span!(
            "coordinate",
            scope = request.scope_id.as_deref().unwrap_or("default"),
            streaming = sink.is_some()
        );
        self.run_in_span(request, cancel, sink).instrument(span).await
    }

    async fn run_in_span(
        &self,
        request: CoordinationRequest,
        cancel: CancellationToken,
        sink: Option<mpsc::Sender<String>>,
    ) -> std::result::Result<CoordinationResult, CoordinationFailure> {
        let started = Instant::now();

        let decision = self.router.route(&request);
        let (plan, plan_warnings) = self.plan(&decision);
        let scope = self.scope(plan.mode);
        let request_id = scope.request_id;
        self.transition(request_id, CoordinationState::Selecting);

        if request.query.trim().is_empty() {
            self.transition(request_id, CoordinationState::Failed);
            return Err(CoordinationFailure::new(
                request_id,
                plan.mode,
                AppError::InvalidInput("query must not be empty".to_string()),
                Vec::new(),
            ));
        }

        info!(
            request_id = %request_id,
            primary = %plan.primary,
            supporting = ?plan.supporting,
            mode = %plan.mode,
            "Coordinating request"
        );

        let budget = self.aggregate_timeout(&plan);
        let work = async {
            let assembled = self.assembler.assemble(&request).await;
            self.transition(request_id, CoordinationState::Executing);
            let outcome = self
                .execute(&scope, &plan, &request.query, &assembled.bundle, sink.as_ref())
                .await?;
            Ok::<_, AppError>((outcome, assembled.warnings))
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            r = tokio::time::timeout(budget, work) => match r {
                Ok(r) => r,
                Err(_) => Err(AppError::RequestTimeout(budget.as_millis() as u64)),
            },
        };

        match result {
            Ok((outcome, context_warnings)) => {
                self.transition(request_id, CoordinationState::Done);
                let mut warnings = decision.warnings;
                warnings.extend(plan_warnings);
                warnings.extend(context_warnings);
                warnings.extend(outcome.warnings);

                let result = CoordinationResult {
                    request_id,
                    primary_agent_id: plan.primary,
                    supporting_agent_ids: plan.supporting,
                    final_response_text: outcome.text,
                    interactions: scope.interactions(),
                    mode: plan.mode,
                    degraded: outcome.degraded,
                    warnings,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    request_id = %request_id,
                    calls = result.interactions.len(),
                    failed = result.failed_calls(),
                    degraded = result.degraded,
                    duration_ms = result.duration_ms,
                    "Coordination complete"
                );
                Ok(result)
            }
            Err(cause) => {
                // No interaction completing after this point is logged
                scope.close();
                self.transition(request_id, CoordinationState::Failed);
                let failure =
                    CoordinationFailure::new(request_id, plan.mode, cause, scope.interactions());
                warn!(request_id = %request_id, error = %failure, "Coordination failed");
                Err(failure)
            }
        }
    }
}

/// Builder for [`Coordinator`]
pub struct CoordinatorBuilder {
    registry: Arc<AgentRegistry>,
    router: Option<Router>,
    assembler: Option<ContextAssembler>,
    log: Option<Arc<InteractionLog>>,
    settings: CoordinationSettings,
}

impl CoordinatorBuilder {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            router: None,
            assembler: None,
            log: None,
            settings: CoordinationSettings::default(),
        }
    }

    /// Applies `[coordination]` and `[routing]` from configuration
    pub fn with_config(mut self, config: &PilotConfig) -> Result<Self> {
        self.settings = CoordinationSettings::from_config(&config.coordination);
        self.router = Some(Router::from_config(Arc::clone(&self.registry), config)?);
        Ok(self)
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Shares an existing interaction log
    pub fn with_log(mut self, log: Arc<InteractionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_settings(mut self, settings: CoordinationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.settings.per_call_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = Some(timeout);
        self
    }

    pub fn with_debate_rounds(mut self, rounds: u8) -> Self {
        self.settings.debate_rounds = rounds.max(1);
        self
    }

    pub fn with_debate_max_participants(mut self, max: usize) -> Self {
        self.settings.debate_max_participants = max.max(1);
        self
    }

    pub fn with_synthesizer(mut self, agent: impl Into<String>) -> Self {
        self.settings.synthesizer = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        if let Some(synth) = &self.settings.synthesizer
            && !self.registry.contains(synth)
        {
            return Err(AppError::Configuration(format!(
                "Synthesizer agent '{}' is not registered",
                synth
            )));
        }

        let router = match self.router {
            Some(router) => router,
            None => Router::new(Arc::clone(&self.registry))?,
        };

        Ok(Coordinator {
            registry: self.registry,
            router,
            assembler: self.assembler.unwrap_or_default(),
            log: self.log.unwrap_or_default(),
            settings: self.settings,
        })
    }
}
