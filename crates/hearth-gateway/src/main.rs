use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use hearth_cache::{CacheStore, ConfigClient, MemoryStore, RedisStore};
use hearth_core::config::Settings;
use hearth_core::model::ChatModel;
use hearth_mode::{ModeEngine, PolicyEngine};
use hearth_orchestrator::{Orchestrator, OrchestratorOptions, Validator};
use hearth_retrieval::{IntentClassifier, RetrievalEngine, RetrievalService};
use hearth_sessions::SessionManager;

use hearth_gateway::app;
use hearth_gateway::model_router::RoutedModel;
use hearth_gateway::ratelimit::RateLimiter;
use hearth_gateway::router_classifier::RouterClassifier;

#[derive(Parser)]
#[command(name = "hearth-gateway", about = "Voice-assistant request orchestrator gateway")]
struct Args {
    /// Override the bind address from the environment.
    #[arg(long)]
    bind: Option<String>,
    /// Override the port from the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth_gateway=info,hearth_mode=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    // Startup misconfiguration is the one fatal error class: exit 1.
    let settings = match Settings::load().and_then(|s| s.validate().map(|()| s)) {
        Ok(settings) => settings,
        Err(e) => {
            error!("startup configuration error: {e}");
            std::process::exit(1);
        }
    };

    // The distributed cache is optional at runtime: if it is down at
    // startup, run on the in-process store and keep serving.
    let cache: Arc<dyn CacheStore> = match RedisStore::connect(&settings.cache_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(err = %e, "distributed cache unreachable, using in-process cache");
            Arc::new(MemoryStore::new())
        }
    };

    let config = Arc::new(ConfigClient::new(
        settings.admin_api_url(),
        Duration::from_secs(settings.config_refresh_ttl_seconds),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (mode_engine, mode_handle) = ModeEngine::new(
        config.clone(),
        cache.clone(),
        Duration::from_secs(settings.mode_poll_interval_seconds),
    );
    tokio::spawn(mode_engine.run(shutdown_rx));

    let policy = PolicyEngine::new(mode_handle.clone(), config.clone());

    let model: Arc<dyn ChatModel> = Arc::new(RoutedModel::new(
        config.clone(),
        settings.model_backend_url(),
        Duration::from_secs(30),
    ));

    let classifier = IntentClassifier::new(
        cache.clone(),
        config.clone(),
        Some(model.clone()),
        Duration::from_secs(settings.intent_cache_ttl_seconds),
        settings.enable_llm_intent_classifier,
    );
    let retrieval = build_retrieval(&settings, cache.clone(), config.clone());
    let sessions = SessionManager::new(
        cache.clone(),
        Duration::from_secs(settings.session_ttl_seconds),
        settings.max_history_messages,
    );
    let validator = Validator::new(
        config.clone(),
        Some(model.clone()),
        settings.enable_llm_fact_check,
    );
    let options = OrchestratorOptions {
        deadline: Duration::from_secs(settings.orchestrator_deadline_seconds),
        history_injected: settings.history_injected_messages,
        ..OrchestratorOptions::default()
    };
    let orchestrator = Orchestrator::new(
        classifier,
        retrieval,
        policy.clone(),
        sessions,
        model.clone(),
        validator,
        config.clone(),
        options,
    );

    let state = Arc::new(app::AppState {
        settings: settings.clone(),
        config: config.clone(),
        cache: cache.clone(),
        mode: mode_handle,
        policy,
        orchestrator,
        router: RouterClassifier::new(Some(model)),
        limiter: RateLimiter::new(),
        http: reqwest::Client::new(),
    });

    spawn_watchdog(cache, config);
    spawn_limiter_pruner(state.clone());

    let bind = args.bind.unwrap_or_else(|| settings.gateway_bind.clone());
    let port = args.port.unwrap_or(settings.gateway_port);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;

    let router = app::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("hearth gateway listening on {addr}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    Ok(())
}

/// Register the retrieval fleet. A service with no configured endpoint
/// stays disabled and the router skips it.
fn build_retrieval(
    settings: &Settings,
    cache: Arc<dyn CacheStore>,
    config: Arc<ConfigClient>,
) -> RetrievalEngine {
    let timeout = Duration::from_secs(settings.provider_timeout_seconds);
    let default_ttl = Duration::from_secs(settings.search_cache_default_ttl_seconds);
    let service = |name: &str, url: &Option<String>| {
        RetrievalService::new(name, url.as_deref().unwrap_or(""), timeout)
    };

    RetrievalEngine::new(cache, config, timeout, default_ttl)
        .register(Arc::new(service(
            "ticketmaster",
            &settings.ticketmaster_service_url,
        )))
        .register(Arc::new(service("seatgeek", &settings.seatgeek_service_url)))
        .register(Arc::new(service("brave", &settings.brave_service_url)))
        .register(Arc::new(service("searxng", &settings.searxng_service_url)))
        .register(Arc::new(
            service("weather", &settings.weather_service_url)
                .with_cache_ttl(Duration::from_secs(600)),
        ))
        .register(Arc::new(
            service("sports", &settings.sports_service_url)
                .with_cache_ttl(Duration::from_secs(300)),
        ))
        .register(Arc::new(
            service("airports", &settings.airports_service_url)
                .with_cache_ttl(Duration::from_secs(120)),
        ))
}

/// Unrecoverable-runtime watchdog. Cache and admin config both
/// unreachable for over a minute with no last-known-good config means
/// every answer from here on is a fallback: exit code 2.
fn spawn_watchdog(cache: Arc<dyn CacheStore>, config: Arc<ConfigClient>) {
    tokio::spawn(async move {
        let mut down_since: Option<Instant> = None;
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            let cache_ok = cache.ping().await;
            let config_has_lkg = config.last_success_age().await.is_some();
            if !cache_ok && !config_has_lkg {
                let since = *down_since.get_or_insert_with(Instant::now);
                if since.elapsed() > Duration::from_secs(60) {
                    error!("cache and admin config unreachable for over 60s with no last-known-good");
                    std::process::exit(2);
                }
            } else {
                down_since = None;
            }
        }
    });
}

fn spawn_limiter_pruner(state: Arc<app::AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            state.limiter.prune();
        }
    });
}
