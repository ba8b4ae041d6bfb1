//! Queue error types

use thiserror::Error;

use crate::entry::{EntryId, EntrySnapshot};
use crate::events::ListenerHandle;

/// Errors surfaced by the queue API.
///
/// Configuration and usage errors are returned synchronously at the call
/// site. Action failures are delivered through the submission's ticket (and
/// an `error` event), never by crashing the dispatch loop.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown event name: {0}")]
    UnknownEvent(String),

    #[error("listener {0} not found")]
    ListenerNotFound(ListenerHandle),

    #[error("no pending entry with id {0}")]
    EntryNotFound(EntryId),

    #[error("entry {} skipped because of duplicate key {:?}", .entry.id, .entry.key)]
    DuplicateKey { entry: EntrySnapshot },

    #[error("action for entry {} failed: {}", .entry.id, .error)]
    ActionFailed {
        entry: EntrySnapshot,
        error: eyre::Report,
    },

    #[error("queue dropped before entry {0} settled")]
    ChannelClosed(EntryId),
}
