use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{HearthError, Result};

/// Process-wide settings, loaded from the environment over built-in
/// defaults. Every knob in the table below maps 1:1 to an environment
/// variable (`SESSION_TTL_SECONDS` → `session_ttl_seconds`, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL for the admin config service. Required.
    pub admin_api_url: Option<String>,
    /// Distributed cache URL.
    pub cache_url: String,
    /// Default model endpoint, used when admin config lists no backends.
    /// Required.
    pub model_backend_url: Option<String>,
    /// Gateway bind address.
    pub gateway_bind: String,
    /// Gateway port.
    pub gateway_port: u16,
    /// Session inactivity TTL (sliding).
    pub session_ttl_seconds: u64,
    /// Hard cap on messages retained per session.
    pub max_history_messages: usize,
    /// How many history messages are injected into the synthesis prompt.
    pub history_injected_messages: usize,
    /// Per-provider retrieval timeout.
    pub provider_timeout_seconds: u64,
    /// Overall orchestration deadline.
    pub orchestrator_deadline_seconds: u64,
    /// In-process TTL for admin config rows.
    pub config_refresh_ttl_seconds: u64,
    /// iCal reconciliation interval.
    pub mode_poll_interval_seconds: u64,
    /// Default TTL for cached per-provider search results.
    pub search_cache_default_ttl_seconds: u64,
    /// TTL for cached intent classifications.
    pub intent_cache_ttl_seconds: u64,
    /// First-stage LLM intent classifier toggle.
    pub enable_llm_intent_classifier: bool,
    /// LLM fact-check validation layer toggle.
    pub enable_llm_fact_check: bool,
    /// Retrieval microservice endpoints. A provider with no endpoint is
    /// simply disabled; the router skips it.
    pub ticketmaster_service_url: Option<String>,
    pub seatgeek_service_url: Option<String>,
    pub brave_service_url: Option<String>,
    pub searxng_service_url: Option<String>,
    pub weather_service_url: Option<String>,
    pub sports_service_url: Option<String>,
    pub airports_service_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_api_url: None,
            cache_url: "redis://localhost:6379".to_string(),
            model_backend_url: None,
            gateway_bind: "0.0.0.0".to_string(),
            gateway_port: 3000,
            session_ttl_seconds: 1800,
            max_history_messages: 20,
            history_injected_messages: 6,
            provider_timeout_seconds: 3,
            orchestrator_deadline_seconds: 25,
            config_refresh_ttl_seconds: 60,
            mode_poll_interval_seconds: 600,
            search_cache_default_ttl_seconds: 900,
            intent_cache_ttl_seconds: 300,
            enable_llm_intent_classifier: false,
            enable_llm_fact_check: false,
            ticketmaster_service_url: None,
            seatgeek_service_url: None,
            brave_service_url: None,
            searxng_service_url: None,
            weather_service_url: None,
            sports_service_url: None,
            airports_service_url: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment over the built-in defaults.
    ///
    /// Fails only on malformed values (e.g. a non-numeric TTL); missing
    /// required URLs are caught separately by [`Settings::validate`] so
    /// the caller can distinguish startup misconfiguration.
    pub fn load() -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::raw().only(&[
                "admin_api_url",
                "cache_url",
                "model_backend_url",
                "gateway_bind",
                "gateway_port",
                "session_ttl_seconds",
                "max_history_messages",
                "history_injected_messages",
                "provider_timeout_seconds",
                "orchestrator_deadline_seconds",
                "config_refresh_ttl_seconds",
                "mode_poll_interval_seconds",
                "search_cache_default_ttl_seconds",
                "intent_cache_ttl_seconds",
                "enable_llm_intent_classifier",
                "enable_llm_fact_check",
                "ticketmaster_service_url",
                "seatgeek_service_url",
                "brave_service_url",
                "searxng_service_url",
                "weather_service_url",
                "sports_service_url",
                "airports_service_url",
            ]))
            .extract()
            .map_err(|e| HearthError::Config(e.to_string()))?;

        Ok(settings)
    }

    /// Check that the required endpoints are present. Called once at
    /// startup; a failure here is fatal (exit code 1).
    pub fn validate(&self) -> Result<()> {
        if self.admin_api_url.as_deref().unwrap_or("").is_empty() {
            return Err(HearthError::Config(
                "ADMIN_API_URL must be set".to_string(),
            ));
        }
        if self.model_backend_url.as_deref().unwrap_or("").is_empty() {
            return Err(HearthError::Config(
                "MODEL_BACKEND_URL must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn admin_api_url(&self) -> &str {
        self.admin_api_url.as_deref().unwrap_or_default()
    }

    pub fn model_backend_url(&self) -> &str {
        self.model_backend_url.as_deref().unwrap_or_default()
    }
}
