//! Two-stage intent classification.
//!
//! An optional small-model classifier runs first when its feature flag
//! is on; on any failure, low confidence, or a disabled flag, the
//! keyword classifier decides. Classification is total: every query
//! yields an intent and a confidence, and nothing here ever raises.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_cache::keys::intent_key;
use hearth_cache::{get_json, set_json, CacheStore, ConfigClient};
use hearth_core::model::{ChatModel, ChatRequest};
use hearth_core::types::{ClassificationRule, Intent};

/// Confidence below which the LLM classifier's answer is discarded in
/// favour of the keyword table.
const LLM_MIN_CONFIDENCE: f64 = 0.6;

/// Confidence assigned to keyword matches and to the general fallback.
const KEYWORD_CONFIDENCE: f64 = 0.85;
const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    /// Extracted entities, keys lowercase (`location`, `team`,
    /// `airport_code`).
    pub entities: BTreeMap<String, String>,
}

pub struct IntentClassifier {
    cache: Arc<dyn CacheStore>,
    config: Arc<ConfigClient>,
    model: Option<Arc<dyn ChatModel>>,
    intent_ttl: Duration,
    llm_enabled_default: bool,
}

impl IntentClassifier {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        config: Arc<ConfigClient>,
        model: Option<Arc<dyn ChatModel>>,
        intent_ttl: Duration,
        llm_enabled_default: bool,
    ) -> Self {
        Self {
            cache,
            config,
            model,
            intent_ttl,
            llm_enabled_default,
        }
    }

    /// Classify a query. Total: always returns an intent from the
    /// enumerated set with confidence in [0, 1].
    pub async fn classify(&self, query: &str) -> Classification {
        let key = intent_key(query);
        if let Some(cached) = get_json::<Classification>(self.cache.as_ref(), &key).await {
            debug!(intent = %cached.intent, "intent cache hit");
            return cached;
        }

        let llm_enabled = self
            .config
            .flag_bool("enable_llm_intent_classifier", self.llm_enabled_default)
            .await;

        let llm_verdict = if llm_enabled {
            match &self.model {
                Some(model) => self.classify_llm(model.as_ref(), query).await,
                None => None,
            }
        } else {
            None
        };

        let (intent, confidence) = match llm_verdict {
            Some((intent, confidence)) if confidence >= LLM_MIN_CONFIDENCE => (intent, confidence),
            _ => {
                let rules = self.config.classification_rules().await;
                keyword_classify(query, &rules)
            }
        };

        let classification = Classification {
            intent,
            confidence,
            entities: extract_entities(query, intent),
        };
        set_json(
            self.cache.as_ref(),
            &key,
            &classification,
            Some(self.intent_ttl),
        )
        .await;
        classification
    }

    async fn classify_llm(&self, model: &dyn ChatModel, query: &str) -> Option<(Intent, f64)> {
        let system = "You label voice-assistant queries for a smart home. \
Categories: control, weather, sports, airports, event_search, news, \
local_business, general, greeting. \
Reply with exactly one line: CATEGORY:<name> CONFIDENCE:<0-1>";
        let req = ChatRequest::single(Some(system), query, 0.1, 24);
        match model.complete(&req).await {
            Ok(resp) => parse_llm_classification(&resp.content),
            Err(e) => {
                debug!(err = %e, "llm classifier failed, falling back to keywords");
                None
            }
        }
    }
}

/// Parse `CATEGORY:<name> CONFIDENCE:<0-1>` from a model reply. Returns
/// `None` on any deviation so the caller falls back.
pub fn parse_llm_classification(content: &str) -> Option<(Intent, f64)> {
    let category = content
        .split("CATEGORY:")
        .nth(1)?
        .split_whitespace()
        .next()?;
    let intent: Intent = category.parse().ok()?;
    let confidence: f64 = content
        .split("CONFIDENCE:")
        .nth(1)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some((intent, confidence.clamp(0.0, 1.0)))
}

/// Keyword classifier: ordered rules, first match wins, `general`
/// otherwise. Admin rules replace the built-in table when present.
pub fn keyword_classify(query: &str, admin_rules: &[ClassificationRule]) -> (Intent, f64) {
    let lowered = query.to_lowercase();

    if !admin_rules.is_empty() {
        for rule in admin_rules {
            for pattern in &rule.patterns {
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(&lowered) => return (rule.intent, KEYWORD_CONFIDENCE),
                    Ok(_) => {}
                    Err(e) => debug!(pattern, err = %e, "skipping malformed admin rule"),
                }
            }
        }
        return (Intent::General, FALLBACK_CONFIDENCE);
    }

    for (intent, patterns) in BUILTIN_RULES.iter() {
        if patterns.iter().any(|re| re.is_match(&lowered)) {
            return (*intent, KEYWORD_CONFIDENCE);
        }
    }
    (Intent::General, FALLBACK_CONFIDENCE)
}

static BUILTIN_RULES: LazyLock<Vec<(Intent, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("built-in classifier pattern"))
            .collect()
    };
    vec![
        (
            Intent::Control,
            compile(&[
                r"\b(turn|switch)\s+(on|off)\b",
                r"\b(lock|unlock|open|close)\s+the\b",
                r"\bset\s+the\s+\w+\s+to\b",
                r"\b(dim|brighten)\b",
                r"\b(play|pause|stop)\s+(the\s+)?(music|tv|movie)\b",
            ]),
        ),
        (
            Intent::Greeting,
            compile(&[
                r"^(hi|hello|hey)\b",
                r"^good\s+(morning|afternoon|evening|night)\b",
                r"\bhow\s+are\s+you\b",
                r"^(thanks|thank\s+you)\b",
            ]),
        ),
        (
            Intent::Weather,
            compile(&[
                r"\bweather\b",
                r"\b(forecast|temperature|rain|raining|snow|snowing|sunny|humidity|windy)\b",
                r"\bhow\s+(hot|cold)\b",
            ]),
        ),
        (
            Intent::Sports,
            compile(&[
                r"\bscores?\b",
                r"\bwho\s+(won|is\s+winning)\b",
                r"\bgame\s+(tonight|today|yesterday)\b",
                r"\b(nfl|nba|mlb|nhl|orioles|ravens)\b",
            ]),
        ),
        (
            Intent::Airports,
            compile(&[
                r"\bflights?\b",
                r"\bairports?\b",
                r"\b(departures?|arrivals?|tsa|layover|gate)\b",
            ]),
        ),
        (
            Intent::EventSearch,
            compile(&[
                r"\bconcerts?\b",
                r"\btickets?\b",
                r"\bwho'?s\s+playing\b",
                r"\b(events?|shows?|festivals?)\b.*\b(tonight|today|tomorrow|this\s+week(end)?|near)\b",
            ]),
        ),
        (
            Intent::News,
            compile(&[
                r"\bnews\b",
                r"\bheadlines?\b",
                r"\bwhat('s|\s+is)\s+happening\b",
            ]),
        ),
        (
            Intent::LocalBusiness,
            compile(&[
                r"\b(restaurants?|coffee|bars?|shops?|stores?|pharmac(y|ies))\b",
                r"\bnear\s+me\b",
                r"\bopen\s+(now|late)\b",
            ]),
        ),
    ]
});

/// Words that end a location phrase rather than belong to it.
const LOCATION_STOPWORDS: &[&str] = &[
    "tonight", "today", "tomorrow", "this", "next", "right", "now", "please",
];

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|near|around)\s+([a-z][a-z .'-]+)").expect("location pattern")
});
static AIRPORT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3})\b").expect("airport code pattern"));
static TEAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(orioles|ravens|yankees|mets|nationals|commanders|capitals|wizards)\b")
        .expect("team pattern")
});

/// Best-effort entity extraction. Keys are lowercase; absence is normal.
pub fn extract_entities(query: &str, intent: Intent) -> BTreeMap<String, String> {
    let mut entities = BTreeMap::new();
    let lowered = query.to_lowercase();

    if let Some(caps) = LOCATION_RE.captures(&lowered) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let mut words: Vec<&str> = raw.split_whitespace().collect();
        while let Some(last) = words.last() {
            let trimmed = last.trim_matches(|c: char| !c.is_alphanumeric());
            if LOCATION_STOPWORDS.contains(&trimmed) || trimmed.is_empty() {
                words.pop();
            } else {
                break;
            }
        }
        if !words.is_empty() {
            let location = words
                .join(" ")
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_string();
            if !location.is_empty() {
                entities.insert("location".to_string(), location);
            }
        }
    }

    if intent == Intent::Airports {
        if let Some(caps) = AIRPORT_CODE_RE.captures(query) {
            entities.insert(
                "airport_code".to_string(),
                caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default(),
            );
        }
    }

    if intent == Intent::Sports {
        if let Some(caps) = TEAM_RE.captures(&lowered) {
            entities.insert(
                "team".to_string(),
                caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
            );
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(query: &str) -> Intent {
        keyword_classify(query, &[]).0
    }

    #[test]
    fn control_queries_classify_as_control() {
        assert_eq!(keyword("turn on the office lights"), Intent::Control);
        assert_eq!(keyword("unlock the front door"), Intent::Control);
        assert_eq!(keyword("set the thermostat to 68"), Intent::Control);
    }

    #[test]
    fn weather_queries_classify_as_weather() {
        assert_eq!(keyword("what's the weather in Baltimore"), Intent::Weather);
        assert_eq!(keyword("is it raining"), Intent::Weather);
    }

    #[test]
    fn event_queries_classify_as_event_search() {
        assert_eq!(keyword("what concerts are in baltimore tonight"), Intent::EventSearch);
        assert_eq!(keyword("any shows this weekend"), Intent::EventSearch);
    }

    #[test]
    fn greetings_classify_as_greeting() {
        assert_eq!(keyword("hello there"), Intent::Greeting);
        assert_eq!(keyword("good morning"), Intent::Greeting);
    }

    #[test]
    fn unmatched_queries_fall_back_to_general() {
        let (intent, confidence) = keyword_classify("tell me about the roman empire", &[]);
        assert_eq!(intent, Intent::General);
        assert!(confidence < KEYWORD_CONFIDENCE);
    }

    #[test]
    fn admin_rules_replace_builtins_in_order() {
        let rules = vec![
            ClassificationRule {
                intent: Intent::News,
                patterns: vec![r"\broman\b".to_string()],
            },
            ClassificationRule {
                intent: Intent::Sports,
                patterns: vec![r"\bempire\b".to_string()],
            },
        ];
        let (intent, _) = keyword_classify("the roman empire", &rules);
        assert_eq!(intent, Intent::News);
    }

    #[test]
    fn malformed_admin_pattern_is_skipped() {
        let rules = vec![ClassificationRule {
            intent: Intent::News,
            patterns: vec!["(unclosed".to_string()],
        }];
        let (intent, _) = keyword_classify("anything at all", &rules);
        assert_eq!(intent, Intent::General);
    }

    #[test]
    fn llm_reply_parses() {
        let parsed = parse_llm_classification("CATEGORY:weather CONFIDENCE:0.92");
        assert_eq!(parsed, Some((Intent::Weather, 0.92)));
    }

    #[test]
    fn llm_reply_with_chatter_still_parses() {
        let parsed =
            parse_llm_classification("Sure! CATEGORY:event_search CONFIDENCE:0.7 hope that helps");
        assert_eq!(parsed, Some((Intent::EventSearch, 0.7)));
    }

    #[test]
    fn garbage_llm_reply_is_rejected() {
        assert!(parse_llm_classification("weather, probably").is_none());
        assert!(parse_llm_classification("CATEGORY:weathery CONFIDENCE:0.9").is_none());
        assert!(parse_llm_classification("CATEGORY:weather CONFIDENCE:high").is_none());
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let parsed = parse_llm_classification("CATEGORY:news CONFIDENCE:1.7");
        assert_eq!(parsed, Some((Intent::News, 1.0)));
    }

    #[test]
    fn location_entity_extracted_and_trimmed() {
        let entities = extract_entities("what concerts are in baltimore tonight", Intent::EventSearch);
        assert_eq!(entities.get("location").map(String::as_str), Some("baltimore"));
    }

    #[test]
    fn airport_code_extracted_for_airport_intent() {
        let entities = extract_entities("when does the next flight leave BWI", Intent::Airports);
        assert_eq!(entities.get("airport_code").map(String::as_str), Some("bwi"));
    }

    #[test]
    fn team_extracted_for_sports_intent() {
        let entities = extract_entities("did the orioles win", Intent::Sports);
        assert_eq!(entities.get("team").map(String::as_str), Some("orioles"));
    }

    #[test]
    fn no_entities_is_fine() {
        let entities = extract_entities("hello", Intent::Greeting);
        assert!(entities.is_empty());
    }

    #[tokio::test]
    async fn repeated_queries_are_served_from_the_intent_cache() {
        use hearth_cache::MemoryStore;
        use std::time::Duration;

        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        // Unreachable admin endpoint: flags and rules fall back.
        let config = Arc::new(ConfigClient::new(
            "http://127.0.0.1:9",
            Duration::from_secs(60),
        ));
        let classifier = IntentClassifier::new(
            cache.clone(),
            config,
            None,
            Duration::from_secs(300),
            false,
        );

        let first = classifier.classify("what's the weather in Baltimore").await;
        assert_eq!(first.intent, Intent::Weather);

        // Overwrite the cached entry; a second call must serve it, not
        // re-classify.
        let planted = Classification {
            intent: Intent::News,
            confidence: 0.99,
            entities: BTreeMap::new(),
        };
        set_json(
            cache.as_ref(),
            &intent_key("what's the weather in Baltimore"),
            &planted,
            None,
        )
        .await;

        let second = classifier.classify("what's the weather in Baltimore").await;
        assert_eq!(second.intent, Intent::News);
    }
}
