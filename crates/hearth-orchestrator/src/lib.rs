//! Orchestrator state machine, classify → route → retrieve →
//! synthesise → validate → finalise, with a mode-aware policy gate
//! between classification and everything that costs money or leaks
//! information.
//!
//! Every stage degrades instead of failing: the pipeline always
//! produces an answer, and `metadata` plus `validation` let callers
//! tell a degraded outcome from a healthy one.

pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod state;
pub mod validate;

pub use model::{select_tier, HttpChatModel, ModelTier};
pub use pipeline::{Orchestrator, OrchestratorOptions};
pub use state::{OrchestratorState, QueryResponse};
pub use validate::Validator;
