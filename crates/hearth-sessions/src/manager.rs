use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use hearth_cache::keys::session_key;
use hearth_cache::{get_json, set_json, CacheStore};

use crate::types::{Session, SessionTurn, TurnRole};

/// Session store over the distributed cache. Every operation is
/// best-effort, an unreachable cache means sessions silently become
/// single-turn, which the pipeline tolerates.
pub struct SessionManager {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    max_messages: usize,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration, max_messages: usize) -> Self {
        Self {
            cache,
            ttl,
            max_messages,
        }
    }

    /// Load a session, history sorted by timestamp. `None` when absent
    /// or expired.
    pub async fn load(&self, session_id: &str) -> Option<Session> {
        let mut session: Session =
            get_json(self.cache.as_ref(), &session_key(session_id)).await?;
        session
            .history
            .sort_by(|a, b| a.ts.cmp(&b.ts));
        Some(session)
    }

    /// The newest `n` turns, oldest first, the shape the synthesis
    /// prompt wants.
    pub async fn recent_turns(&self, session_id: &str, n: usize) -> Vec<SessionTurn> {
        match self.load(session_id).await {
            Some(session) => {
                let len = session.history.len();
                session.history[len.saturating_sub(n)..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Append one user/assistant exchange and re-arm the sliding TTL.
    ///
    /// Idempotent per `request_id`: replaying a finalised request leaves
    /// the history unchanged. The write is last-writer-wins; conflicts
    /// are rare and bounded by the data model.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        request_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) {
        let mut session = self
            .load(session_id)
            .await
            .unwrap_or_else(|| Session::new(session_id));

        if session.has_request(request_id) {
            debug!(session_id, request_id, "exchange already recorded, skipping");
            return;
        }

        let now = Utc::now();
        session.history.push(SessionTurn {
            role: TurnRole::User,
            text: user_text.to_string(),
            ts: now,
            request_id: Some(request_id.to_string()),
        });
        session.history.push(SessionTurn {
            role: TurnRole::Assistant,
            text: assistant_text.to_string(),
            ts: now,
            request_id: Some(request_id.to_string()),
        });

        // Keep only the newest entries.
        let len = session.history.len();
        if len > self.max_messages {
            session.history.drain(..len - self.max_messages);
        }
        session.last_seen = now;

        set_json(
            self.cache.as_ref(),
            &session_key(session_id),
            &session,
            Some(self.ttl),
        )
        .await;
    }
}
