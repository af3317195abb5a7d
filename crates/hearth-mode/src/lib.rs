//! Mode service, reconciles an iCal feed plus admin overrides into the
//! current guest/owner operating mode.
//!
//! One background task polls the feed and publishes whole `ModeSnapshot`
//! values through a watch channel; readers are lock-free. Before the
//! first successful poll the mode is `guest`, failures fail closed.

pub mod error;
pub mod ical;
pub mod policy;
pub mod service;

pub use error::{ModeError, Result};
pub use ical::CalendarEvent;
pub use policy::PolicyEngine;
pub use service::{ModeEngine, ModeHandle};
