//! HTTP-surface tests for the admission gateway. The app state is
//! assembled the same way `main` does it, but on an in-memory cache, an
//! unreachable admin endpoint, a pinned mode handle, and a keyword-only
//! router, so every test is deterministic and offline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use hearth_cache::{CacheStore, ConfigClient, MemoryStore};
use hearth_core::config::Settings;
use hearth_core::types::{Mode, ModeSnapshot};
use hearth_gateway::app::{build_router, AppState};
use hearth_gateway::ratelimit::RateLimiter;
use hearth_gateway::router_classifier::RouterClassifier;
use hearth_mode::{ModeHandle, PolicyEngine};
use hearth_orchestrator::{Orchestrator, OrchestratorOptions, Validator};
use hearth_retrieval::{IntentClassifier, RetrievalEngine};
use hearth_sessions::SessionManager;

fn test_state(mode: Mode) -> Arc<AppState> {
    let mut settings = Settings::default();
    settings.admin_api_url = Some("http://127.0.0.1:9".to_string());
    settings.model_backend_url = Some("http://127.0.0.1:9".to_string());

    let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let config = Arc::new(ConfigClient::new(
        "http://127.0.0.1:9",
        Duration::from_secs(60),
    ));

    let mode_handle = ModeHandle::fixed(ModeSnapshot {
        mode,
        ..ModeSnapshot::fail_closed()
    });
    let policy = PolicyEngine::new(mode_handle.clone(), config.clone());

    let model: Arc<dyn hearth_core::model::ChatModel> =
        Arc::new(hearth_orchestrator::HttpChatModel::new(
            "test-default",
            "http://127.0.0.1:9/v1/chat/completions",
            "test-default",
            Duration::from_secs(1),
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
        Duration::from_secs(1),
        Duration::from_secs(900),
    );
    let sessions = SessionManager::new(cache.clone(), Duration::from_secs(1800), 20);
    let validator = Validator::new(config.clone(), None, false);
    let orchestrator = Orchestrator::new(
        classifier,
        retrieval,
        policy.clone(),
        sessions,
        model,
        validator,
        config.clone(),
        OrchestratorOptions {
            deadline: Duration::from_secs(5),
            ..OrchestratorOptions::default()
        },
    );

    Arc::new(AppState {
        settings,
        config,
        cache,
        mode: mode_handle,
        policy,
        orchestrator,
        // Keyword-only routing keeps admission decisions deterministic.
        router: RouterClassifier::new(None),
        limiter: RateLimiter::new(),
        http: reqwest::Client::new(),
    })
}

fn with_addr(mut req: Request<Body>) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:55555".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("body read failed");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let router = build_router(test_state(Mode::Owner));
    let req = Request::post("/query")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query": "   "}"#))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversize_query_is_rejected() {
    let router = build_router(test_state(Mode::Owner));
    let long = "x".repeat(5000);
    let body = serde_json::json!({ "query": long }).to_string();
    let req = Request::post("/query")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_endpoint_returns_the_full_result_shape() {
    let router = build_router(test_state(Mode::Owner));
    // Greeting short-circuits, so no provider or model is needed.
    let req = Request::post("/query")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query": "good morning"}"#))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["intent"], "greeting");
    assert_eq!(json["mode"], "owner");
    assert!(json["answer"].as_str().is_some_and(|a| !a.is_empty()));
    assert!(json["metadata"]["node_timings"]["total"].is_number());
    assert_eq!(json["validation"]["passed"], serde_json::json!(true));
}

#[tokio::test]
async fn health_reports_components_and_mode() {
    let router = build_router(test_state(Mode::Guest));
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // Admin config is unreachable in this harness, so degraded.
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["mode"], "guest");
    assert_eq!(json["components"]["cache"], "ok");
    assert_eq!(json["components"]["config"], "unreachable");
}

#[tokio::test]
async fn mode_current_serves_the_snapshot() {
    let router = build_router(test_state(Mode::Guest));
    let req = Request::get("/mode/current").body(Body::empty()).unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["mode"], "guest");
}

#[tokio::test]
async fn models_endpoint_lists_the_default_backend() {
    let router = build_router(test_state(Mode::Owner));
    let req = Request::get("/v1/models").body(Body::empty()).unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["object"], "list");
    assert_eq!(json["data"][0]["id"], "default");
}

#[tokio::test]
async fn streaming_requests_are_rejected() {
    let router = build_router(test_state(Mode::Owner));
    let body = serde_json::json!({
        "model": "m",
        "messages": [{"role": "user", "content": "hello"}],
        "stream": true,
    })
    .to_string();
    let req = Request::post("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_without_user_message_is_rejected() {
    let router = build_router(test_state(Mode::Owner));
    let body = serde_json::json!({
        "model": "m",
        "messages": [{"role": "system", "content": "you are helpful"}],
    })
    .to_string();
    let req = Request::post("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn domain_chat_is_answered_through_the_orchestrator() {
    let router = build_router(test_state(Mode::Owner));
    // "weather" routes to the orchestrator; with no providers and an
    // unreachable model it still answers with the safe fallback.
    let body = serde_json::json!({
        "model": "m",
        "messages": [{"role": "user", "content": "what's the weather in Baltimore"}],
    })
    .to_string();
    let req = Request::post("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("x-session-id", "test-session")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(with_addr(req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["object"], "chat.completion");
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");
    let content = json["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.to_lowercase().contains("don't have current information"));
}

#[tokio::test]
async fn over_limit_requests_get_429_with_openai_error_body() {
    let state = test_state(Mode::Guest);
    // Guest default policy allows 20 queries per minute.
    let router = build_router(state);

    let mut last_status = StatusCode::OK;
    let mut last_response = None;
    for _ in 0..21 {
        let body = serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "good morning"}],
        })
        .to_string();
        let req = Request::post("/v1/chat/completions")
            .header("content-type", "application/json")
            .header("x-session-id", "rate-limit-session")
            .body(Body::from(body))
            .unwrap();
        let response = router.clone().oneshot(with_addr(req)).await.unwrap();
        last_status = response.status();
        last_response = Some(response);
    }

    assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(last_response.unwrap()).await;
    assert_eq!(json["error"]["type"], "rate_limit_error");
}
