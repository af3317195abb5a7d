//! Model tier selection and the HTTP chat backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use hearth_core::model::{ChatCompletion, ChatModel, ChatRequest, ModelError};

/// Model size class chosen by `route_info`. Bigger tiers buy a larger
/// output budget at higher latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }

    pub fn max_output_tokens(&self) -> u32 {
        match self {
            ModelTier::Small => 256,
            ModelTier::Medium => 512,
            ModelTier::Large => 1024,
        }
    }
}

/// Rough token estimate, four characters per token is close enough
/// for tier routing.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Tier table: small up to `small_max` estimated tokens, medium up to
/// `medium_max`, large beyond.
pub fn select_tier(estimated_tokens: usize, small_max: usize, medium_max: usize) -> ModelTier {
    if estimated_tokens <= small_max {
        ModelTier::Small
    } else if estimated_tokens <= medium_max {
        ModelTier::Medium
    } else {
        ModelTier::Large
    }
}

/// Chat-completions HTTP backend. Accepts both response shapes the
/// model fleet emits: an OpenAI-style `choices[0].message.content` and
/// the bare `{response}` of a generate endpoint.
pub struct HttpChatModel {
    name: String,
    endpoint_url: String,
    model_name: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChatModel {
    pub fn new(name: &str, endpoint_url: &str, model_name: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            endpoint_url: endpoint_url.to_string(),
            model_name: model_name.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
        let body = serde_json::json!({
            "model": self.model_name,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "stream": false,
        });

        debug!(backend = %self.name, model = %self.model_name, "sending chat request");

        let resp = self
            .client
            .post(&self.endpoint_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    ModelError::Http(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(backend = %self.name, status, "model backend rejected request");
            return Err(ModelError::Api { status, message });
        }

        let wire: WireCompletion = resp
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        extract_completion(wire, &self.model_name)
    }
}

fn extract_completion(wire: WireCompletion, fallback_model: &str) -> Result<ChatCompletion, ModelError> {
    let model = wire.model.unwrap_or_else(|| fallback_model.to_string());
    let (tokens_in, tokens_out) = wire
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    let content = wire
        .choices
        .and_then(|mut choices| {
            if choices.is_empty() {
                None
            } else {
                choices.remove(0).message.map(|m| m.content)
            }
        })
        .or(wire.response)
        .ok_or_else(|| ModelError::Parse("no content in model response".to_string()))?;

    Ok(ChatCompletion {
        content,
        model,
        tokens_in,
        tokens_out,
    })
}

// Wire types (deserialization only).

#[derive(Deserialize)]
struct WireCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Option<Vec<WireChoice>>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_selection_follows_the_table() {
        assert_eq!(select_tier(100, 256, 1024), ModelTier::Small);
        assert_eq!(select_tier(256, 256, 1024), ModelTier::Small);
        assert_eq!(select_tier(600, 256, 1024), ModelTier::Medium);
        assert_eq!(select_tier(2000, 256, 1024), ModelTier::Large);
    }

    #[test]
    fn bigger_tiers_allow_more_output() {
        assert!(ModelTier::Small.max_output_tokens() < ModelTier::Medium.max_output_tokens());
        assert!(ModelTier::Medium.max_output_tokens() < ModelTier::Large.max_output_tokens());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn openai_shape_parses() {
        let wire: WireCompletion = serde_json::from_value(serde_json::json!({
            "model": "m-small",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }))
        .unwrap();
        let completion = extract_completion(wire, "fallback").unwrap();
        assert_eq!(completion.content, "hello");
        assert_eq!(completion.model, "m-small");
        assert_eq!(completion.tokens_in, 10);
        assert_eq!(completion.tokens_out, 5);
    }

    #[test]
    fn bare_response_shape_parses() {
        let wire: WireCompletion =
            serde_json::from_value(serde_json::json!({"response": "generated text"})).unwrap();
        let completion = extract_completion(wire, "fallback").unwrap();
        assert_eq!(completion.content, "generated text");
        assert_eq!(completion.model, "fallback");
    }

    #[test]
    fn contentless_response_is_a_parse_error() {
        let wire: WireCompletion = serde_json::from_value(serde_json::json!({"model": "m"})).unwrap();
        assert!(matches!(
            extract_completion(wire, "fallback"),
            Err(ModelError::Parse(_))
        ));
    }
}
