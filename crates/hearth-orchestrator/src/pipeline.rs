//! The six-stage pipeline. Stages run in order; each records its wall
//! time; each degrades instead of failing. The overall deadline wraps
//! the whole run: on expiry every in-flight sub-call is cancelled and
//! the safe fallback is returned with `metadata.timeout = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hearth_cache::ConfigClient;
use hearth_core::model::{ChatModel, ChatRequest, ModelError};
use hearth_core::types::{Intent, IntentPolicy, QueryRequest, ValidationReport};
use hearth_mode::PolicyEngine;
use hearth_retrieval::{IntentClassifier, RetrievalEngine};
use hearth_sessions::SessionManager;

use crate::model::{estimate_tokens, select_tier};
use crate::prompt;
use crate::state::OrchestratorState;
use crate::validate::Validator;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Overall deadline for one orchestration.
    pub deadline: Duration,
    /// How many session turns are injected into the synthesis prompt.
    pub history_injected: usize,
    /// Classifications below this confidence short-circuit to a
    /// clarifying answer.
    pub min_confidence: f64,
    /// Tier table thresholds, in estimated tokens.
    pub tier_small_max: usize,
    pub tier_medium_max: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(25),
            history_injected: 6,
            min_confidence: 0.3,
            tier_small_max: 256,
            tier_medium_max: 1024,
        }
    }
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    retrieval: RetrievalEngine,
    policy: PolicyEngine,
    sessions: SessionManager,
    model: Arc<dyn ChatModel>,
    validator: Validator,
    config: Arc<ConfigClient>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: IntentClassifier,
        retrieval: RetrievalEngine,
        policy: PolicyEngine,
        sessions: SessionManager,
        model: Arc<dyn ChatModel>,
        validator: Validator,
        config: Arc<ConfigClient>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            classifier,
            retrieval,
            policy,
            sessions,
            model,
            validator,
            config,
            options,
        }
    }

    /// Run one orchestration to completion. Always returns a state with
    /// an answer; degraded outcomes are visible in `validation` and
    /// `metadata`, never as an error.
    pub async fn handle(&self, request: QueryRequest) -> OrchestratorState {
        let total_start = Instant::now();
        let cancel = CancellationToken::new();
        let mut state = OrchestratorState::new(request);

        let timed_out = tokio::time::timeout(
            self.options.deadline,
            self.run_stages(&mut state, &cancel),
        )
        .await
        .is_err();

        if timed_out {
            cancel.cancel();
            warn!(
                request_id = %state.request.request_id,
                deadline_secs = self.options.deadline.as_secs(),
                "orchestration deadline exceeded"
            );
            state.answer = prompt::safe_fallback(&prompt::topic_paraphrase(&state.request.query));
            state.citations.clear();
            state.note_bool("timeout", true);
        }

        state.record_timing("total", total_start);
        info!(
            request_id = %state.request.request_id,
            intent = %state.intent,
            mode = %state.mode,
            retrieved = state.retrieved.len(),
            timed_out,
            "orchestration complete"
        );
        state
    }

    async fn run_stages(&self, state: &mut OrchestratorState, cancel: &CancellationToken) {
        let query = state.request.query.clone();

        // classify
        let started = Instant::now();
        let classification = self.classifier.classify(&query).await;
        state.intent = classification.intent;
        state.confidence = classification.confidence;
        state.entities = classification.entities;
        // Caller-provided context fills entity gaps; extracted values win.
        for (key, value) in &state.request.context {
            state
                .entities
                .entry(key.to_lowercase())
                .or_insert_with(|| value.clone());
        }
        state.record_timing("classify", started);

        // policy gate, before any provider or model call
        let snapshot = self.policy.mode().current();
        state.mode = snapshot.mode;
        let policy = self.policy.policy_for(state.intent).await;
        let intent_allowed = policy.allowed
            && (policy.allowed_intents.is_empty() || policy.allowed_intents.contains(&state.intent));
        if !intent_allowed || restricted_entity_hit(&policy, &query, state) {
            state.answer = prompt::policy_refusal();
            state.validation = Some(ValidationReport::passed());
            state.note_bool("policy_blocked", true);
            return;
        }

        if state.intent == Intent::Unknown || state.confidence < self.options.min_confidence {
            state.answer = prompt::clarifying_answer();
            state.validation = Some(ValidationReport::passed());
            state.note_bool("clarification", true);
            return;
        }

        // short-circuit paths bypass retrieval and synthesis
        if state.intent == Intent::Control {
            let started = Instant::now();
            state.answer = prompt::control_acknowledgement();
            state.validation = Some(ValidationReport::passed());
            state.record_timing("route_control", started);
            self.finalise(state).await;
            return;
        }
        if state.intent == Intent::Greeting {
            let started = Instant::now();
            state.answer = prompt::greeting_reply();
            state.validation = Some(ValidationReport::passed());
            state.record_timing("greeting_reply", started);
            self.finalise(state).await;
            return;
        }

        // route_info, pick the model tier from query + carried history
        let started = Instant::now();
        let history = match &state.request.session_id {
            Some(id) => {
                self.sessions
                    .recent_turns(id, self.options.history_injected)
                    .await
            }
            None => Vec::new(),
        };
        let history_chars: usize = history.iter().map(|t| t.text.len()).sum();
        let estimated = estimate_tokens(&query) + history_chars.div_ceil(4);
        let small_max = self
            .config
            .flag_u64("tier_small_max_tokens", self.options.tier_small_max as u64)
            .await as usize;
        let medium_max = self
            .config
            .flag_u64("tier_medium_max_tokens", self.options.tier_medium_max as u64)
            .await as usize;
        let tier = select_tier(estimated, small_max, medium_max);
        state.note_str("model_tier", tier.as_str());
        state.record_timing("route_info", started);

        // retrieve
        let started = Instant::now();
        state.retrieved = self
            .retrieval
            .retrieve(state.intent, &query, &state.entities, cancel)
            .await;
        state.record_timing("retrieve", started);

        // synthesise
        let started = Instant::now();
        let messages = if state.retrieved.is_empty() {
            prompt::no_evidence_messages(&query, &history)
        } else {
            prompt::evidence_messages(&query, &state.retrieved, &history)
        };
        let request = ChatRequest {
            messages,
            temperature: prompt::SYNTHESIS_TEMPERATURE,
            max_tokens: tier.max_output_tokens(),
        };
        match self.model.complete(&request).await {
            Ok(completion) => {
                state.answer = completion.content;
                state.citations = prompt::citations_for(&state.answer, &state.retrieved);
                state.record_timing("synthesise", started);
            }
            Err(e) => {
                state.record_timing("synthesise", started);
                warn!(err = %e, "synthesis failed, returning safe fallback");
                state.answer = prompt::safe_fallback(&prompt::topic_paraphrase(&query));
                state.citations.clear();
                state.note_str("synthesis_error", model_error_kind(&e));
                // validation stays unset: the validator never saw this answer
                self.finalise(state).await;
                return;
            }
        }

        // validate
        let started = Instant::now();
        let report = self.validator.validate(&state.answer, &state.retrieved).await;
        state.record_timing("validate", started);
        state.validation = Some(report);

        self.finalise(state).await;
    }

    /// Final stage: swap in the safe fallback on failed validation,
    /// append the exchange to the session. Session write failures are
    /// already swallowed inside the manager, the user gets the answer
    /// regardless.
    async fn finalise(&self, state: &mut OrchestratorState) {
        let started = Instant::now();

        if let Some(validation) = &state.validation {
            if !validation.passed {
                state.answer =
                    prompt::safe_fallback(&prompt::topic_paraphrase(&state.request.query));
                state.citations.clear();
            }
        }

        if let Some(session_id) = &state.request.session_id {
            self.sessions
                .append_exchange(
                    session_id,
                    &state.request.request_id,
                    &state.request.query,
                    &state.answer,
                )
                .await;
        }

        state.record_timing("finalise", started);
    }
}

/// Whether a restricted entity pattern matches the query or any
/// extracted entity value.
fn restricted_entity_hit(policy: &IntentPolicy, query: &str, state: &OrchestratorState) -> bool {
    if policy.restricted_entity_patterns.is_empty() {
        return false;
    }
    let lowered = query.to_lowercase();
    for pattern in &policy.restricted_entity_patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(pattern, err = %e, "skipping malformed policy pattern");
                continue;
            }
        };
        if re.is_match(&lowered) {
            return true;
        }
        if state.entities.values().any(|v| re.is_match(v)) {
            return true;
        }
    }
    false
}

fn model_error_kind(err: &ModelError) -> &'static str {
    match err {
        ModelError::Http(_) => "http",
        ModelError::Api { .. } => "api",
        ModelError::Parse(_) => "parse",
        ModelError::Timeout { .. } => "timeout",
        ModelError::NoBackend => "no_backend",
        ModelError::Cancelled => "cancelled",
    }
}
