//! The reconciliation loop and its read handle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use hearth_cache::keys::MODE_CURRENT_KEY;
use hearth_cache::{set_json, CacheStore, ConfigClient};
use hearth_core::types::{ActiveEvent, Mode, ModeConfig, ModeOverride, ModeSnapshot};

use crate::ical::{self, CalendarEvent};

/// iCal fetch timeout. The feed host is external; a hung fetch must not
/// stall the loop past one interval.
const ICAL_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only access to the current mode. Cheap to clone; `current()` is
/// a watch-channel borrow, safe from any concurrent caller.
#[derive(Clone)]
pub struct ModeHandle {
    rx: watch::Receiver<Arc<ModeSnapshot>>,
    events: Arc<RwLock<Vec<CalendarEvent>>>,
}

impl ModeHandle {
    pub fn current(&self) -> Arc<ModeSnapshot> {
        self.rx.borrow().clone()
    }

    /// Recent parsed events, for the diagnostics endpoint.
    pub async fn recent_events(&self) -> Vec<CalendarEvent> {
        self.events.read().await.clone()
    }

    /// A handle that never leaves the fail-closed guest snapshot.
    /// Used by tests and by startup paths before the engine exists.
    pub fn fixed(snapshot: ModeSnapshot) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(snapshot));
        Self {
            rx,
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

/// Background engine: polls the iCal feed every `poll_interval` and
/// publishes whole snapshots. Consumers observe either the old or the
/// new snapshot, never a partial value.
pub struct ModeEngine {
    config: Arc<ConfigClient>,
    cache: Arc<dyn CacheStore>,
    http: reqwest::Client,
    tx: watch::Sender<Arc<ModeSnapshot>>,
    events: Arc<RwLock<Vec<CalendarEvent>>>,
    poll_interval: Duration,
    consecutive_failures: u32,
}

impl ModeEngine {
    /// Create the engine plus its read handle. The handle starts on the
    /// fail-closed guest snapshot until the first successful poll.
    pub fn new(
        config: Arc<ConfigClient>,
        cache: Arc<dyn CacheStore>,
        poll_interval: Duration,
    ) -> (Self, ModeHandle) {
        let (tx, rx) = watch::channel(Arc::new(ModeSnapshot::fail_closed()));
        let events = Arc::new(RwLock::new(Vec::new()));
        let handle = ModeHandle {
            rx,
            events: events.clone(),
        };
        let engine = Self {
            config,
            cache,
            http: reqwest::Client::new(),
            tx,
            events,
            poll_interval,
            consecutive_failures: 0,
        };
        (engine, handle)
    }

    /// Main loop. Reconciles immediately, then every `poll_interval`,
    /// until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.poll_interval.as_secs(), "mode engine started");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reconcile().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mode engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One reconciliation pass. On fetch failure the previous snapshot
    /// stays published, mode never flaps on a flaky feed.
    pub async fn reconcile(&mut self) {
        let mode_config = self.config.mode_config().await;

        if !mode_config.enabled || mode_config.ical_url.is_empty() {
            self.publish(compute_snapshot(Utc::now(), &mode_config, &[], &[]))
                .await;
            self.consecutive_failures = 0;
            return;
        }

        let events = match self.fetch_feed(&mode_config.ical_url).await {
            Ok(events) => {
                self.consecutive_failures = 0;
                events
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= 3 {
                    warn!(
                        failures = self.consecutive_failures,
                        err = %e,
                        "calendar feed unreachable, keeping previous mode"
                    );
                } else {
                    debug!(err = %e, "calendar fetch failed, keeping previous mode");
                }
                return;
            }
        };

        let overrides = self.config.overrides().await;
        let snapshot = compute_snapshot(Utc::now(), &mode_config, &overrides, &events);

        *self.events.write().await = events;
        self.publish(snapshot).await;
    }

    async fn fetch_feed(&self, url: &str) -> crate::Result<Vec<CalendarEvent>> {
        let resp = self
            .http
            .get(url)
            .timeout(ICAL_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| crate::ModeError::Fetch(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(crate::ModeError::Fetch(format!(
                "feed returned {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| crate::ModeError::Fetch(e.to_string()))?;
        ical::parse_events(&body)
    }

    async fn publish(&self, snapshot: ModeSnapshot) {
        debug!(mode = %snapshot.mode, "publishing mode snapshot");
        let snapshot = Arc::new(snapshot);
        // Watch send only fails when every receiver is gone; nothing to do then.
        let _ = self.tx.send(snapshot.clone());
        set_json(self.cache.as_ref(), MODE_CURRENT_KEY, snapshot.as_ref(), None).await;
    }
}

/// Pure mode computation: overrides trump the calendar; the calendar
/// window is widened by the configured buffers; otherwise owner.
pub fn compute_snapshot(
    now: DateTime<Utc>,
    config: &ModeConfig,
    overrides: &[ModeOverride],
    events: &[CalendarEvent],
) -> ModeSnapshot {
    let source_events_hash = ical::events_hash(events);

    if !config.enabled || config.ical_url.is_empty() {
        return ModeSnapshot {
            mode: Mode::Owner,
            active_event: None,
            computed_at: now,
            source_events_hash,
        };
    }

    // Highest-priority active override sets the mode directly; ties
    // break on the most recent activation. An override without an
    // explicit expiry runs out after the configured override TTL.
    let implicit_ttl = chrono::Duration::minutes(config.override_ttl_minutes as i64);
    if let Some(active) = overrides
        .iter()
        .filter(|o| o.is_active(now))
        .filter(|o| o.expires_at.is_some() || now < o.activated_at + implicit_ttl)
        .max_by_key(|o| (o.priority, o.activated_at))
    {
        return ModeSnapshot {
            mode: active.mode,
            active_event: None,
            computed_at: now,
            source_events_hash,
        };
    }

    let before = chrono::Duration::hours(config.buffer_before_checkin_hours);
    let after = chrono::Duration::hours(config.buffer_after_checkout_hours);

    let mut matching: Vec<&CalendarEvent> = events
        .iter()
        .filter(|e| now >= e.start - before && now <= e.end + after)
        .collect();
    matching.sort_by_key(|e| e.start);

    match matching.first() {
        Some(event) => ModeSnapshot {
            mode: Mode::Guest,
            active_event: Some(ActiveEvent {
                checkin: event.start,
                checkout: event.end,
                source_uid: event.uid.clone(),
            }),
            computed_at: now,
            source_events_hash,
        },
        None => ModeSnapshot {
            mode: Mode::Owner,
            active_event: None,
            computed_at: now,
            source_events_hash,
        },
    }
}
