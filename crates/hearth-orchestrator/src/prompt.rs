//! Prompt construction and the fixed answer texts.
//!
//! Two synthesis branches: with evidence the model is confined to the
//! provided context; without evidence it must acknowledge the gap and
//! is explicitly forbidden from inventing specifics.

use hearth_core::model::{ChatMessage, ChatRole};
use hearth_core::types::{Citation, RetrievalResult};
use hearth_sessions::{SessionTurn, TurnRole};

/// Temperature for both synthesis branches.
pub const SYNTHESIS_TEMPERATURE: f32 = 0.3;

const EVIDENCE_SYSTEM: &str = "You are a home voice assistant. Answer the user's \
question using ONLY the context items below. Cite nothing that is not in the \
context, and do not state specific facts (dates, times, prices, phone numbers, \
addresses) unless they appear verbatim in a context item. If the context only \
partially answers the question, say what is known and what is not. Keep the \
answer short enough to read aloud.";

const NO_EVIDENCE_SYSTEM: &str = "You are a home voice assistant. No current \
information is available for this question. Say so plainly, and suggest where \
the user could look instead. You MUST NOT state any specific date, time, venue, \
name, monetary amount, or phone number. Keep it to two sentences.";

/// Build the with-evidence synthesis messages.
pub fn evidence_messages(
    query: &str,
    retrieved: &[RetrievalResult],
    history: &[SessionTurn],
) -> Vec<ChatMessage> {
    let mut context = String::from("Context items:\n");
    for (i, item) in retrieved.iter().enumerate() {
        context.push_str(&format!(
            "[{}] ({}) {}, {}\n",
            i + 1,
            item.source,
            item.title,
            item.snippet
        ));
    }

    let mut messages = vec![ChatMessage {
        role: ChatRole::System,
        content: format!("{EVIDENCE_SYSTEM}\n\n{context}"),
    }];
    push_history(&mut messages, history);
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: query.to_string(),
    });
    messages
}

/// Build the no-supporting-data synthesis messages.
pub fn no_evidence_messages(query: &str, history: &[SessionTurn]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: ChatRole::System,
        content: NO_EVIDENCE_SYSTEM.to_string(),
    }];
    push_history(&mut messages, history);
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: query.to_string(),
    });
    messages
}

fn push_history(messages: &mut Vec<ChatMessage>, history: &[SessionTurn]) {
    for turn in history {
        messages.push(ChatMessage {
            role: match turn.role {
                TurnRole::User => ChatRole::User,
                TurnRole::Assistant => ChatRole::Assistant,
            },
            content: turn.text.clone(),
        });
    }
}

/// Fixed answer when validation fails, synthesis errors, or the
/// deadline expires. Contains no specific factual claims.
pub fn safe_fallback(topic: &str) -> String {
    if topic.is_empty() {
        "I don't have current information to answer that accurately. \
I recommend checking a reliable source directly."
            .to_string()
    } else {
        format!(
            "I don't have current information to answer that accurately. \
I recommend checking reliable sources about {topic}."
        )
    }
}

/// Fixed refusal when the mode policy blocks the request.
pub fn policy_refusal() -> String {
    "I can't help with that while the home is in guest mode.".to_string()
}

/// Clarifying answer for unknown or low-confidence classifications.
pub fn clarifying_answer() -> String {
    "I'm not sure what you're asking for. Could you rephrase that?".to_string()
}

/// Short-circuit acknowledgement for device-control requests.
pub fn control_acknowledgement() -> String {
    "Okay, sending that to your home controller.".to_string()
}

pub fn greeting_reply() -> String {
    "Hello! Ask me about the weather, local events, sports, flights, or your home."
        .to_string()
}

/// A short paraphrase of the query for the safe fallback, the first
/// few content words, with question scaffolding stripped.
pub fn topic_paraphrase(query: &str) -> String {
    const FILLER: &[&str] = &[
        "what", "whats", "what's", "who", "whos", "who's", "when", "where", "how", "is", "are",
        "the", "a", "an", "in", "on", "at", "me", "my", "tell", "about", "please", "can", "you",
        "do", "does",
    ];
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !FILLER.contains(&w.to_lowercase().as_str()))
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Citations for the items the answer actually drew on.
///
/// An item is cited when one of its snippet's content words (4+ chars)
/// appears in the answer. When the overlap scan matches nothing the
/// heuristic is considered uncomputable and every prompted item is
/// cited instead.
pub fn citations_for(answer: &str, prompted: &[RetrievalResult]) -> Vec<Citation> {
    let answer_lower = answer.to_lowercase();

    let used: Vec<&RetrievalResult> = prompted
        .iter()
        .filter(|item| {
            item.snippet
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() >= 4)
                .any(|w| answer_lower.contains(w))
        })
        .collect();

    let cited: Vec<&RetrievalResult> = if used.is_empty() {
        prompted.iter().collect()
    } else {
        used
    };

    cited
        .into_iter()
        .map(|item| Citation {
            source: item.source.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            retrieved_at: item
                .metadata
                .get("fetched_at")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        })
        .collect()
}
