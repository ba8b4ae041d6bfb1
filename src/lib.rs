//! trickleq - in-process async task queue
//!
//! Submit actions, get a ticket, and let the queue decide when each runs:
//! a concurrency gate caps how many actions are in flight, a priority-then-
//! FIFO order picks the next entry, an optional rate limiter enforces both a
//! max-calls-per-sliding-window cap and a minimum gap between consecutive
//! dispatches, and optional duplicate-key suppression skips work already
//! pending, active, or retained.
//!
//! This is a client-side throttling primitive for one process: no
//! persistence, no cross-process coordination, no cancellation of in-flight
//! actions.
//!
//! # Example
//!
//! ```rust,no_run
//! use trickleq::{EntryOptions, Queue, QueueConfig};
//!
//! # async fn demo() -> Result<(), trickleq::QueueError> {
//! let config = QueueConfig {
//!     concurrency_limit: Some(2),
//!     rate_limit_enabled: true,
//!     rate_limit_window_ms: 60_000,
//!     rate_limit_max_per_window: 10,
//!     ..Default::default()
//! };
//! let queue: Queue<String> = Queue::with_config(config)?;
//!
//! let ticket = queue
//!     .add_with(
//!         |entry| async move { Ok(format!("ran entry {}", entry.id)) },
//!         EntryOptions::default().with_key("fetch-users").with_priority(10),
//!     )
//!     .await;
//!
//! let completion = ticket.done().await?;
//! assert_eq!(completion.result.as_deref(), Some("ran entry 1"));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] - queue-level configuration (closed key set, validated)
//! - [`entry`] - entry lifecycle state and per-submission options
//! - [`events`] - lifecycle event kinds and the listener registry
//! - [`scheduler`] - the dispatch queue, rate-limit history, and queue core
//! - [`error`] - the error enum

pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod scheduler;

mod clock;

pub use config::QueueConfig;
pub use entry::{EntryId, EntryOptions, EntrySnapshot, EntryStatus};
pub use error::QueueError;
pub use events::{EventBus, EventKind, ListenerHandle, QueueEvent};
pub use scheduler::{ActionFuture, Completion, Queue, Ticket};
