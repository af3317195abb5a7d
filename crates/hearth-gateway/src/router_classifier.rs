//! Admission routing: does this request go through the orchestrator,
//! or straight to a raw model backend?
//!
//! A one-shot prompt to a fast model decides when available; a keyword
//! check decides whenever the model call fails or answers off-script.

use std::sync::Arc;

use tracing::debug;

use hearth_core::model::{ChatModel, ChatRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Orchestrator,
    Passthrough,
}

const ROUTER_PROMPT: &str = "You route requests for a home voice assistant. \
If the message asks about the home, devices, weather, local events, sports, \
flights, news, or nearby places, reply exactly: orchestrator. \
For anything else (general chat, coding, writing), reply exactly: passthrough. \
Reply with one word only.";

/// Domain keywords that mark a query as assistant territory.
const DOMAIN_KEYWORDS: &[&str] = &[
    "weather", "forecast", "temperature", "concert", "event", "show", "ticket", "score", "game",
    "flight", "airport", "news", "headline", "restaurant", "near me", "nearby", "turn on",
    "turn off", "lights", "thermostat", "lock", "unlock", "garage", "door", "hey hearth",
];

pub struct RouterClassifier {
    model: Option<Arc<dyn ChatModel>>,
}

impl RouterClassifier {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { model }
    }

    pub async fn decide(&self, query: &str) -> Route {
        if let Some(model) = &self.model {
            let req = ChatRequest::single(Some(ROUTER_PROMPT), query, 0.1, 10);
            match model.complete(&req).await {
                Ok(resp) => {
                    if let Some(route) = parse_route_label(&resp.content) {
                        return route;
                    }
                    debug!(reply = %resp.content, "router label unparseable, using keywords");
                }
                Err(e) => debug!(err = %e, "router model failed, using keywords"),
            }
        }
        keyword_route(query)
    }
}

/// Accept the first recognisable label in the reply; anything else is
/// a parse failure.
pub fn parse_route_label(reply: &str) -> Option<Route> {
    let lowered = reply.to_lowercase();
    let orch = lowered.find("orchestrator");
    let pass = lowered.find("passthrough");
    match (orch, pass) {
        (Some(o), Some(p)) if o < p => Some(Route::Orchestrator),
        (Some(_), None) => Some(Route::Orchestrator),
        (Some(_), Some(_)) | (None, Some(_)) => Some(Route::Passthrough),
        (None, None) => None,
    }
}

/// Deterministic fallback: domain keywords send a query to the
/// orchestrator, everything else passes through.
pub fn keyword_route(query: &str) -> Route {
    let lowered = query.to_lowercase();
    if DOMAIN_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        Route::Orchestrator
    } else {
        Route::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_core::model::{ChatCompletion, ModelError};

    struct ScriptedModel(&'static str);

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
            Ok(ChatCompletion {
                content: self.0.to_string(),
                model: "scripted".to_string(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
            Err(ModelError::Http("down".to_string()))
        }
    }

    #[test]
    fn labels_parse() {
        assert_eq!(parse_route_label("orchestrator"), Some(Route::Orchestrator));
        assert_eq!(parse_route_label("Passthrough."), Some(Route::Passthrough));
        assert_eq!(parse_route_label("definitely neither"), None);
    }

    #[test]
    fn first_label_wins_when_both_present() {
        assert_eq!(
            parse_route_label("orchestrator, not passthrough"),
            Some(Route::Orchestrator)
        );
    }

    #[test]
    fn domain_queries_route_to_orchestrator() {
        assert_eq!(keyword_route("what's the weather today"), Route::Orchestrator);
        assert_eq!(keyword_route("turn on the lights"), Route::Orchestrator);
        assert_eq!(keyword_route("any concerts nearby"), Route::Orchestrator);
    }

    #[test]
    fn general_chat_passes_through() {
        assert_eq!(keyword_route("write me a haiku about rust"), Route::Passthrough);
    }

    #[tokio::test]
    async fn model_verdict_is_used_when_parseable() {
        let classifier = RouterClassifier::new(Some(Arc::new(ScriptedModel("passthrough"))));
        assert_eq!(classifier.decide("what's the weather").await, Route::Passthrough);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_keywords() {
        let classifier = RouterClassifier::new(Some(Arc::new(FailingModel)));
        assert_eq!(classifier.decide("what's the weather").await, Route::Orchestrator);
    }

    #[tokio::test]
    async fn unparseable_verdict_falls_back_to_keywords() {
        let classifier = RouterClassifier::new(Some(Arc::new(ScriptedModel("hmm, tricky"))));
        assert_eq!(classifier.decide("turn on the lights").await, Route::Orchestrator);
    }
}
