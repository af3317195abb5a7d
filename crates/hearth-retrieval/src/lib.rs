//! Parallel retrieval engine, turns a classified query into a fused,
//! ranked list of evidence items.
//!
//! The flow is: classify intent → route to the providers registered for
//! that intent → dispatch to all of them concurrently, each behind its
//! own timeout and cache key → fuse the per-provider lists into one
//! ranked, truncated result set. Provider failures never propagate; a
//! broken provider just contributes nothing this round.

pub mod classify;
pub mod dispatch;
pub mod error;
pub mod fusion;
pub mod provider;
pub mod route;

pub use classify::{Classification, IntentClassifier};
pub use dispatch::RetrievalEngine;
pub use error::{ProviderError, Result};
pub use provider::{Provider, RetrievalService};
pub use route::RouteTable;
