//! The pipeline's working record, owned exclusively by one in-flight
//! orchestration.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use hearth_core::types::{
    Citation, Intent, Mode, QueryRequest, RetrievalResult, ValidationReport,
};

#[derive(Debug)]
pub struct OrchestratorState {
    pub request: QueryRequest,
    pub intent: Intent,
    pub confidence: f64,
    /// Extracted entities, keys lowercase.
    pub entities: BTreeMap<String, String>,
    pub mode: Mode,
    pub retrieved: Vec<RetrievalResult>,
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Unset when synthesis failed before the validator ran.
    pub validation: Option<ValidationReport>,
    /// Stage name → elapsed seconds.
    pub node_timings: BTreeMap<String, f64>,
    /// Open observability bag. Restricted to scalar values so
    /// serialisation is total, use the `note_*` helpers.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OrchestratorState {
    pub fn new(request: QueryRequest) -> Self {
        Self {
            request,
            intent: Intent::Unknown,
            confidence: 0.0,
            entities: BTreeMap::new(),
            mode: Mode::Guest,
            retrieved: Vec::new(),
            answer: String::new(),
            citations: Vec::new(),
            validation: None,
            node_timings: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn record_timing(&mut self, stage: &str, started: Instant) {
        self.node_timings
            .insert(stage.to_string(), started.elapsed().as_secs_f64());
    }

    pub fn note_bool(&mut self, key: &str, value: bool) {
        self.metadata
            .insert(key.to_string(), serde_json::Value::Bool(value));
    }

    pub fn note_str(&mut self, key: &str, value: &str) {
        self.metadata
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }

    pub fn note_num(&mut self, key: &str, value: u64) {
        self.metadata
            .insert(key.to_string(), serde_json::Value::from(value));
    }

    /// Build the wire response. Timings and the dominant data source
    /// travel inside `metadata` alongside the pipeline's notes.
    pub fn into_response(self) -> QueryResponse {
        let mut metadata = self.metadata;
        metadata.insert(
            "node_timings".to_string(),
            serde_json::to_value(&self.node_timings).unwrap_or_default(),
        );
        if let Some(top) = self.retrieved.first() {
            metadata.insert(
                "data_source".to_string(),
                serde_json::Value::String(top.source.clone()),
            );
        }
        QueryResponse {
            answer: self.answer,
            citations: self.citations,
            intent: self.intent,
            confidence: self.confidence,
            mode: self.mode,
            validation: self.validation,
            metadata,
        }
    }
}

/// Wire shape of `POST /query`.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub intent: Intent,
    pub confidence: f64,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}
