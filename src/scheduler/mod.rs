//! Admission and dispatch
//!
//! Three pieces: the ordered [`dispatch`] queue of pending entries, the
//! [`rate_limit`] history that decides when the next dispatch is legal, and
//! the [`core`] engine that ties them to the concurrency gate and the entry
//! lifecycle.

mod core;
mod dispatch;
mod rate_limit;

pub use self::core::{ActionFuture, Completion, Queue, Ticket};
pub(crate) use rate_limit::RateLimitPolicy;
