//! Conversation sessions, stored whole in the distributed cache.
//!
//! Sessions are keyed `session:{id}` and expire after the configured
//! inactivity TTL (sliding, every write re-arms it). History is capped
//! to the newest N turns on every write. Writes are last-writer-wins:
//! two pipelines racing on one session may interleave, which the data
//! model accepts, and history is timestamp-sorted on read.

pub mod manager;
pub mod types;

pub use manager::SessionManager;
pub use types::{Session, SessionTurn, TurnRole};
