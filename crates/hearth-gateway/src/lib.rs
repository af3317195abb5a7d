//! Admission gateway: the OpenAI-compatible front door plus the
//! internal orchestrator and mode endpoints. The binary in `main.rs`
//! wires settings, the cache, the mode loop, and the orchestrator into
//! [`app::AppState`] and serves [`app::build_router`].

pub mod app;
pub mod http;
pub mod model_router;
pub mod passthrough;
pub mod ratelimit;
pub mod router_classifier;
