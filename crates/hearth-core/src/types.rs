use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse categorisation of a user utterance. Picks the retrieval plan
/// and the prompt template for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Control,
    Weather,
    Sports,
    Airports,
    EventSearch,
    News,
    LocalBusiness,
    General,
    Greeting,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Control => "control",
            Intent::Weather => "weather",
            Intent::Sports => "sports",
            Intent::Airports => "airports",
            Intent::EventSearch => "event_search",
            Intent::News => "news",
            Intent::LocalBusiness => "local_business",
            Intent::General => "general",
            Intent::Greeting => "greeting",
            Intent::Unknown => "unknown",
        }
    }

    /// Intents that bypass retrieval and synthesis entirely.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Intent::Control | Intent::Greeting)
    }

    /// Intents whose answers must be grounded in external data.
    pub fn requires_retrieval(&self) -> bool {
        !matches!(self, Intent::Control | Intent::Greeting | Intent::Unknown)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "control" => Ok(Intent::Control),
            "weather" => Ok(Intent::Weather),
            "sports" => Ok(Intent::Sports),
            "airports" => Ok(Intent::Airports),
            "event_search" | "events" => Ok(Intent::EventSearch),
            "news" => Ok(Intent::News),
            "local_business" => Ok(Intent::LocalBusiness),
            "general" => Ok(Intent::General),
            "greeting" => Ok(Intent::Greeting),
            "unknown" => Ok(Intent::Unknown),
            _ => Err(()),
        }
    }
}

/// The binary operating state that gates which intents and entities are
/// permitted. `Guest` is the restrictive setting; failures fail closed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Guest,
    Owner,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Guest => "guest",
            Mode::Owner => "owner",
        })
    }
}

/// The calendar event currently holding the system in guest mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub checkin: DateTime<Utc>,
    pub checkout: DateTime<Utc>,
    pub source_uid: String,
}

/// Immutable, atomically published record of the current operating mode.
/// Readers always observe a whole snapshot, never a partial one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSnapshot {
    pub mode: Mode,
    pub active_event: Option<ActiveEvent>,
    pub computed_at: DateTime<Utc>,
    /// Hash over the parsed source events, for change detection in diagnostics.
    pub source_events_hash: String,
}

impl ModeSnapshot {
    /// The snapshot published before the first successful reconciliation.
    /// Guest is the restrictive default, the mode fails closed.
    pub fn fail_closed() -> Self {
        Self {
            mode: Mode::Guest,
            active_event: None,
            computed_at: Utc::now(),
            source_events_hash: String::new(),
        }
    }
}

/// A single retrieved evidence item, normalised from whatever shape the
/// upstream provider returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Provider identifier, e.g. "ticketmaster", "weather".
    pub source: String,
    pub title: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider-assigned confidence in [0, 1]; fusion re-weights this.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Attribution for one retrieved item the synthesised answer drew on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// RFC 3339 timestamp of when the underlying item was fetched.
    pub retrieved_at: String,
}

/// Outcome of the anti-hallucination gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

impl ValidationReport {
    pub fn passed() -> Self {
        Self {
            passed: true,
            reason: None,
            details: Vec::new(),
        }
    }

    pub fn failed(reason: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            details,
        }
    }
}

/// One model backend row pulled from admin config. Created and mutated
/// externally; this process only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub id: String,
    pub model_name: String,
    pub endpoint_url: String,
    pub enabled: bool,
    /// Lower is preferred.
    pub priority: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature_default: f32,
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_backend_timeout() -> u64 {
    30
}

/// An admin-managed feature flag. The value is an open scalar or map;
/// accessors coerce with a caller-supplied default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub value: serde_json::Value,
}

impl FeatureFlag {
    pub fn as_bool(&self, default: bool) -> bool {
        match &self.value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => default,
        }
    }

    pub fn as_u64(&self, default: u64) -> u64 {
        self.value.as_u64().unwrap_or(default)
    }

    pub fn as_f64(&self, default: f64) -> f64 {
        self.value.as_f64().unwrap_or(default)
    }
}

/// One pattern-matching rule for the fallback keyword classifier.
/// Rules are ordered; the first matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub intent: Intent,
    pub patterns: Vec<String>,
}

/// Projection of the current mode onto a specific intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPolicy {
    pub allowed: bool,
    pub rate_limit_per_minute: u32,
    #[serde(default)]
    pub allowed_intents: Vec<Intent>,
    #[serde(default)]
    pub restricted_entity_patterns: Vec<String>,
    #[serde(default)]
    pub allowed_device_domains: Vec<String>,
}

impl IntentPolicy {
    /// The permissive default applied when no admin policy row exists.
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            rate_limit_per_minute: 60,
            allowed_intents: Vec::new(),
            restricted_entity_patterns: Vec::new(),
            allowed_device_domains: Vec::new(),
        }
    }
}

/// An admin-persisted mode override. Active overrides trump the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeOverride {
    pub mode: Mode,
    pub activated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub source: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub deactivated: bool,
}

impl ModeOverride {
    /// Whether this override applies at `now`. Expired or deactivated
    /// records are ignored.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.deactivated {
            return false;
        }
        match self.expires_at {
            Some(exp) => exp > now,
            None => true,
        }
    }
}

/// Admin-managed settings for the mode reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ical_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Hours before check-in during which the mode is already guest.
    #[serde(default = "default_buffer_before")]
    pub buffer_before_checkin_hours: i64,
    /// Hours after check-out during which the mode is still guest.
    #[serde(default = "default_buffer_after")]
    pub buffer_after_checkout_hours: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_pin_hash: Option<String>,
    #[serde(default = "default_override_ttl")]
    pub override_ttl_minutes: u64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ical_url: String::new(),
            poll_interval_seconds: default_poll_interval(),
            buffer_before_checkin_hours: default_buffer_before(),
            buffer_after_checkout_hours: default_buffer_after(),
            owner_pin_hash: None,
            override_ttl_minutes: default_override_ttl(),
        }
    }
}

fn default_poll_interval() -> u64 {
    600
}
fn default_buffer_before() -> i64 {
    2
}
fn default_buffer_after() -> i64 {
    1
}
fn default_override_ttl() -> u64 {
    60
}

/// An immutable record of one user utterance. Created at gateway entry,
/// flows through the pipeline, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub request_id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Maximum accepted query size in bytes. Longer queries are rejected
/// with a client error before the pipeline runs.
pub const MAX_QUERY_BYTES: usize = 4096;
