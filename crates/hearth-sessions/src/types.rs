use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: TurnRole,
    pub text: String,
    pub ts: DateTime<Utc>,
    /// The request that produced this turn. Used to make finalise
    /// idempotent: replaying a request id appends nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// A conversation session. Lives only in the distributed cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<SessionTurn>,
}

impl Session {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            last_seen: now,
            history: Vec::new(),
        }
    }

    /// Whether any turn was produced by `request_id`.
    pub fn has_request(&self, request_id: &str) -> bool {
        self.history
            .iter()
            .any(|t| t.request_id.as_deref() == Some(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_empty() {
        let s = Session::new("abc");
        assert_eq!(s.session_id, "abc");
        assert!(s.history.is_empty());
    }

    #[test]
    fn has_request_finds_turn_by_id() {
        let mut s = Session::new("abc");
        s.history.push(SessionTurn {
            role: TurnRole::User,
            text: "hi".to_string(),
            ts: Utc::now(),
            request_id: Some("req-1".to_string()),
        });
        assert!(s.has_request("req-1"));
        assert!(!s.has_request("req-2"));
    }
}
