//! Config/cache layer, distributed cache client plus a thin in-process
//! TTL cache over admin-config reads.
//!
//! Every operation here is non-fatal to its caller: transport errors are
//! logged and surface as a miss or a no-op. The system must keep working,
//! correctly if more slowly, with the cache fully unreachable.

pub mod config_client;
pub mod keys;
pub mod memory;
pub mod store;

pub use config_client::ConfigClient;
pub use memory::MemoryStore;
pub use store::{get_json, set_json, CacheStore, RedisStore};
