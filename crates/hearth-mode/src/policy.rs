//! Policy projection, the current mode folded onto one intent.

use std::sync::Arc;

use hearth_cache::ConfigClient;
use hearth_core::types::{Intent, IntentPolicy, Mode};

use crate::service::ModeHandle;

/// Derives per-intent policy from the published mode snapshot plus
/// admin-stored policy rows.
#[derive(Clone)]
pub struct PolicyEngine {
    mode: ModeHandle,
    config: Arc<ConfigClient>,
}

impl PolicyEngine {
    pub fn new(mode: ModeHandle, config: Arc<ConfigClient>) -> Self {
        Self { mode, config }
    }

    pub fn mode(&self) -> &ModeHandle {
        &self.mode
    }

    /// The effective policy for `intent` under the current mode.
    pub async fn policy_for(&self, intent: Intent) -> IntentPolicy {
        let snapshot = self.mode.current();
        let admin_row = self.config.policy(intent).await;
        resolve_policy(snapshot.mode, intent, admin_row)
    }
}

/// Fold one admin policy row (if any) with the built-in defaults for
/// the given mode.
///
/// Owner mode is permissive: the admin row only contributes its rate
/// limit. Guest mode applies the admin row as-is when present, and
/// otherwise a conservative built-in that keeps informational intents
/// open but fences device control away from locks and security gear.
pub fn resolve_policy(mode: Mode, intent: Intent, admin_row: Option<IntentPolicy>) -> IntentPolicy {
    match mode {
        Mode::Owner => {
            let rate = admin_row
                .as_ref()
                .map(|p| p.rate_limit_per_minute)
                .unwrap_or(60);
            IntentPolicy {
                rate_limit_per_minute: rate,
                ..IntentPolicy::allow_all()
            }
        }
        Mode::Guest => admin_row.unwrap_or_else(|| guest_default(intent)),
    }
}

fn guest_default(intent: Intent) -> IntentPolicy {
    match intent {
        Intent::Control => IntentPolicy {
            allowed: true,
            rate_limit_per_minute: 20,
            allowed_intents: Vec::new(),
            restricted_entity_patterns: vec![
                r"\block\b".to_string(),
                r"unlock".to_string(),
                r"alarm".to_string(),
                r"garage".to_string(),
                r"camera".to_string(),
            ],
            allowed_device_domains: vec![
                "light".to_string(),
                "switch".to_string(),
                "media_player".to_string(),
                "climate".to_string(),
            ],
        },
        _ => IntentPolicy {
            allowed: true,
            rate_limit_per_minute: 20,
            allowed_intents: Vec::new(),
            restricted_entity_patterns: Vec::new(),
            allowed_device_domains: Vec::new(),
        },
    }
}
