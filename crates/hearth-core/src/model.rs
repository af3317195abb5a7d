//! The language-model seam. Everything that talks to a model backend
//! (synthesis, the intent classifier, the fact-checker, the gateway's
//! router classifier) goes through [`ChatModel`], so tests substitute
//! scripted fakes and the HTTP implementation lives in one place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A non-streaming chat request. The caller decides temperature and the
/// output budget; the implementation decides which backend serves it.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// A single-turn request, the common case for classifier-style calls.
    pub fn single(system: Option<&str>, user: &str, temperature: f32, max_tokens: u32) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: ChatRole::System,
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: ChatRole::User,
            content: user.to_string(),
        });
        Self {
            messages,
            temperature,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(String),

    #[error("model returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model response unparseable: {0}")]
    Parse(String),

    #[error("model timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("no enabled model backend")]
    NoBackend,

    #[error("operation cancelled")]
    Cancelled,
}

/// Common interface for model backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Send a chat request and wait for the full response.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ModelError>;
}
