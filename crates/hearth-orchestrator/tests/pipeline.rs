//! End-to-end pipeline tests with stubbed providers and a scripted
//! model. Nothing here touches the network: the admin endpoint is
//! unreachable (config falls back to defaults), the cache is in-memory,
//! and the mode handle is pinned.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use hearth_cache::{CacheStore, ConfigClient, MemoryStore};
use hearth_core::model::{ChatCompletion, ChatModel, ChatRequest, ModelError};
use hearth_core::types::{Intent, Mode, ModeSnapshot, QueryRequest, RetrievalResult};
use hearth_mode::{ModeHandle, PolicyEngine};
use hearth_orchestrator::{Orchestrator, OrchestratorOptions};
use hearth_retrieval::{IntentClassifier, Provider, RetrievalEngine};
use hearth_sessions::SessionManager;

struct ScriptedModel {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, _req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatCompletion {
            content: self.reply.clone(),
            model: "scripted".to_string(),
            tokens_in: 20,
            tokens_out: 20,
        })
    }
}

struct StubProvider {
    name: &'static str,
    results: Vec<RetrievalResult>,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(name: &'static str, results: Vec<RetrievalResult>) -> Arc<Self> {
        Arc::new(Self {
            name,
            results,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }
    async fn search(
        &self,
        _query: &str,
        _location: Option<&str>,
        _limit: usize,
    ) -> hearth_retrieval::Result<Vec<RetrievalResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}

struct SleepyProvider(&'static str);

#[async_trait]
impl Provider for SleepyProvider {
    fn name(&self) -> &str {
        self.0
    }
    async fn search(
        &self,
        _query: &str,
        _location: Option<&str>,
        _limit: usize,
    ) -> hearth_retrieval::Result<Vec<RetrievalResult>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

fn weather_result() -> RetrievalResult {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "fetched_at".to_string(),
        serde_json::json!("2026-08-01T12:00:00Z"),
    );
    RetrievalResult {
        source: "weather".to_string(),
        title: "Baltimore Forecast".to_string(),
        snippet: "72°F Sunny with light winds".to_string(),
        url: None,
        confidence: 0.9,
        metadata,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    model: Arc<ScriptedModel>,
    cache: Arc<MemoryStore>,
}

fn build(
    mode: Mode,
    reply: &str,
    providers: Vec<Arc<dyn Provider>>,
    options: OrchestratorOptions,
    provider_timeout: Duration,
) -> Harness {
    let cache = Arc::new(MemoryStore::new());
    let cache_dyn: Arc<dyn CacheStore> = cache.clone();
    // Unreachable admin endpoint; every config read falls back.
    let config = Arc::new(ConfigClient::new(
        "http://127.0.0.1:9",
        Duration::from_secs(60),
    ));

    let classifier = IntentClassifier::new(
        cache_dyn.clone(),
        config.clone(),
        None,
        Duration::from_secs(300),
        false,
    );

    let mut retrieval = RetrievalEngine::new(
        cache_dyn.clone(),
        config.clone(),
        provider_timeout,
        Duration::from_secs(900),
    );
    for provider in providers {
        retrieval = retrieval.register(provider);
    }

    let snapshot = ModeSnapshot {
        mode,
        ..ModeSnapshot::fail_closed()
    };
    let policy = PolicyEngine::new(ModeHandle::fixed(snapshot), config.clone());
    let sessions = SessionManager::new(cache_dyn, Duration::from_secs(1800), 20);
    let model = ScriptedModel::new(reply);
    let validator = hearth_orchestrator::Validator::new(config.clone(), None, false);

    let orchestrator = Orchestrator::new(
        classifier,
        retrieval,
        policy,
        sessions,
        model.clone(),
        validator,
        config,
        options,
    );
    Harness {
        orchestrator,
        model,
        cache,
    }
}

fn request(query: &str) -> QueryRequest {
    QueryRequest {
        request_id: uuid_like(query),
        query: query.to_string(),
        session_id: None,
        user_id: None,
        context: BTreeMap::new(),
    }
}

fn uuid_like(seed: &str) -> String {
    format!("req-{}", seed.len())
}

#[tokio::test]
async fn device_control_short_circuits_without_synthesis() {
    let harness = build(
        Mode::Owner,
        "should never be used",
        vec![],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("turn on the office lights"))
        .await;

    assert_eq!(state.intent, Intent::Control);
    assert!(state.retrieved.is_empty());
    assert!(state.citations.is_empty());
    assert!(!state.answer.is_empty());
    assert_eq!(harness.model.calls.load(Ordering::SeqCst), 0);
    assert!(state.node_timings.contains_key("route_control"));
    assert!(state.node_timings.contains_key("total"));
}

#[tokio::test]
async fn weather_with_evidence_passes_validation_and_cites() {
    let weather = StubProvider::new("weather", vec![weather_result()]);
    let harness = build(
        Mode::Owner,
        "It's 72°F and sunny in Baltimore right now.",
        vec![weather],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("what's the weather in Baltimore"))
        .await;

    assert_eq!(state.intent, Intent::Weather);
    assert!(state.validation.as_ref().unwrap().passed);
    assert!(state.answer.contains("72"));
    assert!(state.answer.to_lowercase().contains("sunny"));
    assert_eq!(state.citations.len(), 1);
    assert_eq!(state.citations[0].source, "weather");
    assert_eq!(state.citations[0].retrieved_at, "2026-08-01T12:00:00Z");
}

#[tokio::test]
async fn no_data_branch_acknowledges_the_gap() {
    let empty_events = StubProvider::new("ticketmaster", vec![]);
    let empty_web = StubProvider::new("brave", vec![]);
    let harness = build(
        Mode::Owner,
        "I don't have current concert listings for tonight. A local venue site would know.",
        vec![empty_events, empty_web],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("what concerts are in baltimore tonight"))
        .await;

    assert_eq!(state.intent, Intent::EventSearch);
    assert!(state.retrieved.is_empty());
    assert!(state.citations.is_empty());
    assert!(state.validation.as_ref().unwrap().passed);
    assert!(state.answer.to_lowercase().contains("don't have"));
}

#[tokio::test]
async fn hallucinated_specifics_are_replaced_with_the_safe_fallback() {
    let empty_events = StubProvider::new("ticketmaster", vec![]);
    let harness = build(
        Mode::Owner,
        "The National is playing at Rams Head Live on March 15 at 7:30 PM",
        vec![empty_events],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("what concerts are in baltimore tonight"))
        .await;

    let validation = state.validation.as_ref().unwrap();
    assert!(!validation.passed);
    assert!(validation.reason.is_some());
    assert!(state.citations.is_empty());
    assert!(!state.answer.contains("March 15"));
    assert!(state.answer.to_lowercase().contains("don't have current information"));
}

#[tokio::test]
async fn guest_mode_blocks_restricted_control_entities() {
    let harness = build(
        Mode::Guest,
        "should never be used",
        vec![],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("unlock the front door"))
        .await;

    assert_eq!(state.metadata["policy_blocked"], serde_json::json!(true));
    assert!(!state.answer.is_empty());
    assert_eq!(harness.model.calls.load(Ordering::SeqCst), 0);
    assert!(state.retrieved.is_empty());
}

#[tokio::test]
async fn deadline_exceeded_returns_fallback_within_epsilon() {
    let sleepy: Arc<dyn Provider> = Arc::new(SleepyProvider("weather"));
    let options = OrchestratorOptions {
        deadline: Duration::from_millis(300),
        ..OrchestratorOptions::default()
    };
    // Provider timeout longer than the deadline so the deadline fires first.
    let harness = build(
        Mode::Owner,
        "unused",
        vec![sleepy],
        options,
        Duration::from_secs(10),
    );

    let started = Instant::now();
    let state = harness
        .orchestrator
        .handle(request("what's the weather in Baltimore"))
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(1000));
    assert_eq!(state.metadata["timeout"], serde_json::json!(true));
    assert!(state.answer.to_lowercase().contains("don't have current information"));
    assert!(state.citations.is_empty());
}

#[tokio::test]
async fn caller_context_fills_missing_entities() {
    let weather = StubProvider::new("weather", vec![weather_result()]);
    let harness = build(
        Mode::Owner,
        "Sunny out there.",
        vec![weather],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let mut req = request("what's the weather like");
    req.context
        .insert("location".to_string(), "baltimore".to_string());
    let state = harness.orchestrator.handle(req).await;

    assert_eq!(state.entities.get("location").map(String::as_str), Some("baltimore"));
}

#[tokio::test]
async fn owner_mode_allows_the_same_control_request() {
    let harness = build(
        Mode::Owner,
        "unused",
        vec![],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let state = harness
        .orchestrator
        .handle(request("unlock the front door"))
        .await;

    assert_eq!(state.intent, Intent::Control);
    assert!(!state.metadata.contains_key("policy_blocked"));
}

#[tokio::test]
async fn replayed_request_id_does_not_duplicate_session_history() {
    let harness = build(
        Mode::Owner,
        "Hello!",
        vec![],
        OrchestratorOptions::default(),
        Duration::from_secs(3),
    );
    let mut req = request("good morning");
    req.session_id = Some("sess-1".to_string());
    req.request_id = "fixed-req".to_string();

    harness.orchestrator.handle(req.clone()).await;
    harness.orchestrator.handle(req).await;

    let cache_dyn: Arc<dyn CacheStore> = harness.cache.clone();
    let sessions = SessionManager::new(cache_dyn, Duration::from_secs(1800), 20);
    let session = sessions.load("sess-1").await.expect("session missing");
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn synthesis_failure_degrades_to_fallback_with_error_kind() {
    struct BrokenModel;

    #[async_trait]
    impl ChatModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }
        async fn complete(&self, _req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
            Err(ModelError::Timeout { seconds: 30 })
        }
    }

    let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let config = Arc::new(ConfigClient::new(
        "http://127.0.0.1:9",
        Duration::from_secs(60),
    ));
    let classifier = IntentClassifier::new(
        cache.clone(),
        config.clone(),
        None,
        Duration::from_secs(300),
        false,
    );
    let retrieval = RetrievalEngine::new(
        cache.clone(),
        config.clone(),
        Duration::from_secs(3),
        Duration::from_secs(900),
    )
    .register(StubProvider::new("weather", vec![weather_result()]));
    let policy = PolicyEngine::new(
        ModeHandle::fixed(ModeSnapshot {
            mode: Mode::Owner,
            ..ModeSnapshot::fail_closed()
        }),
        config.clone(),
    );
    let sessions = SessionManager::new(cache, Duration::from_secs(1800), 20);
    let validator = hearth_orchestrator::Validator::new(config.clone(), None, false);
    let orchestrator = Orchestrator::new(
        classifier,
        retrieval,
        policy,
        sessions,
        Arc::new(BrokenModel),
        validator,
        config,
        OrchestratorOptions::default(),
    );

    let state = orchestrator
        .handle(request("what's the weather in Baltimore"))
        .await;

    assert_eq!(state.metadata["synthesis_error"], serde_json::json!("timeout"));
    assert!(state.validation.is_none());
    assert!(state.answer.to_lowercase().contains("don't have current information"));
    assert!(state.citations.is_empty());
}
