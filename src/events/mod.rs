//! Lifecycle event types and the listener registry
//!
//! The queue announces lifecycle transitions (`add`, `start`, `finish`,
//! `error`, `skip`, `ratewait`, `empty`, `startqueue`, `stopqueue`) through
//! an [`EventBus`]. Dispatch is synchronous and in registration order;
//! listener panics propagate to the caller of the emitting operation.

mod bus;
mod types;

pub use bus::{EventBus, ListenerHandle};
pub use types::{EventKind, QueueEvent};
