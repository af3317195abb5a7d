//! Anti-hallucination gate.
//!
//! Layered: a regex pass flags specific fact patterns (dates, clock
//! times, money, phone numbers); the support check fails answers that
//! state specifics with no retrieved evidence; an optional LLM
//! fact-check cross-examines the answer against the context. Every
//! layer fails closed, an error in the gate counts as a failed
//! validation, never a pass.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use hearth_cache::ConfigClient;
use hearth_core::model::{ChatModel, ChatRequest};
use hearth_core::types::{RetrievalResult, ValidationReport};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}\b|\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}(/\d{2,4})?\b",
    )
    .expect("date pattern")
});
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}\s*(a\.?m\.?|p\.?m\.?)?\b|\b\d{1,2}\s*(a\.?m\.?|p\.?m\.?)\b")
        .expect("time pattern")
});
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]\s?\d[\d,]*(\.\d{2})?|\b\d+\s+(dollars|euros|pounds)\b")
        .expect("money pattern")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").expect("phone pattern")
});

/// Scan an answer for specific fact patterns. Returns human-readable
/// labels for each hit, e.g. `date: March 15`.
pub fn detect_fact_patterns(text: &str) -> Vec<String> {
    let mut hits = Vec::new();
    let mut scan = |label: &str, re: &Regex| {
        for m in re.find_iter(text) {
            hits.push(format!("{label}: {}", m.as_str().trim()));
        }
    };
    scan("date", &DATE_RE);
    scan("time", &TIME_RE);
    scan("money", &MONEY_RE);
    scan("phone", &PHONE_RE);
    hits
}

pub struct Validator {
    config: Arc<ConfigClient>,
    fact_check_model: Option<Arc<dyn ChatModel>>,
    fact_check_default: bool,
}

impl Validator {
    pub fn new(
        config: Arc<ConfigClient>,
        fact_check_model: Option<Arc<dyn ChatModel>>,
        fact_check_default: bool,
    ) -> Self {
        Self {
            config,
            fact_check_model,
            fact_check_default,
        }
    }

    /// Validate an answer against the retrieved evidence.
    pub async fn validate(&self, answer: &str, retrieved: &[RetrievalResult]) -> ValidationReport {
        let patterns = detect_fact_patterns(answer);

        if !patterns.is_empty() && retrieved.is_empty() {
            return ValidationReport::failed(
                "answer states specific facts with no supporting data",
                patterns,
            );
        }

        let fact_check_on = self
            .config
            .flag_bool("enable_llm_fact_check", self.fact_check_default)
            .await;
        if fact_check_on {
            if let Some(model) = &self.fact_check_model {
                return self.llm_fact_check(model.as_ref(), answer, retrieved).await;
            }
        }

        ValidationReport::passed()
    }

    /// Ask a fast model whether the answer makes claims the context
    /// does not support. Transport or parse failures fail closed.
    async fn llm_fact_check(
        &self,
        model: &dyn ChatModel,
        answer: &str,
        retrieved: &[RetrievalResult],
    ) -> ValidationReport {
        let mut context = String::new();
        for item in retrieved {
            context.push_str(&format!("- {}: {}\n", item.title, item.snippet));
        }
        let user = format!(
            "Context:\n{context}\nAnswer:\n{answer}\n\nDoes the answer contain claims \
not supported by the context? Reply with strict JSON only: \
{{\"contains_hallucinations\": bool, \"reason\": string, \"specific_claims\": [string]}}"
        );
        let req = ChatRequest::single(None, &user, 0.1, 256);

        let content = match model.complete(&req).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(err = %e, "fact-check model unavailable, failing closed");
                return ValidationReport::failed("fact check unavailable", Vec::new());
            }
        };

        match parse_fact_check(&content) {
            Some(verdict) if verdict.contains_hallucinations => ValidationReport::failed(
                verdict
                    .reason
                    .unwrap_or_else(|| "unsupported claims detected".to_string()),
                verdict.specific_claims,
            ),
            Some(_) => ValidationReport::passed(),
            None => {
                debug!(reply = %content, "fact-check reply unparseable, failing closed");
                ValidationReport::failed("fact check reply unparseable", Vec::new())
            }
        }
    }
}

#[derive(Deserialize)]
struct FactCheckVerdict {
    contains_hallucinations: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    specific_claims: Vec<String>,
}

/// Parse the strict-JSON fact-check reply, tolerating markdown fences
/// around it.
fn parse_fact_check(content: &str) -> Option<FactCheckVerdict> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str(stripped).ok()
}
