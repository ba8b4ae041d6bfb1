//! Event vocabulary for queue lifecycle notifications

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::entry::EntrySnapshot;
use crate::error::QueueError;

/// The closed set of event kinds a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entry was accepted into the dispatch queue.
    Add,
    /// An entry's action started running.
    Start,
    /// An entry's action settled successfully.
    Finish,
    /// An entry's action failed (or a duplicate was treated as an error).
    Error,
    /// An entry was suppressed as a duplicate key.
    Skip,
    /// Both the dispatch queue and the active set became empty.
    Empty,
    /// The queue was started.
    StartQueue,
    /// The queue was stopped.
    StopQueue,
    /// A queued entry entered (or re-targeted) a rate-limit wait.
    RateWait,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Add,
        EventKind::Start,
        EventKind::Finish,
        EventKind::Error,
        EventKind::Skip,
        EventKind::Empty,
        EventKind::StartQueue,
        EventKind::StopQueue,
        EventKind::RateWait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Start => "start",
            EventKind::Finish => "finish",
            EventKind::Error => "error",
            EventKind::Skip => "skip",
            EventKind::Empty => "empty",
            EventKind::StartQueue => "startqueue",
            EventKind::StopQueue => "stopqueue",
            EventKind::RateWait => "ratewait",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QueueError::UnknownEvent(s.to_string()))
    }
}

/// A lifecycle notification with its payload.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Added { entry: EntrySnapshot },
    Started { entry: EntrySnapshot },
    Finished { entry: EntrySnapshot },
    Failed { entry: EntrySnapshot, message: String },
    Skipped { entry: EntrySnapshot, message: String },
    RateWait { entry: EntrySnapshot, wait: Duration },
    Empty,
    QueueStarted,
    QueueStopped,
}

impl QueueEvent {
    /// The kind listeners subscribe to.
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::Added { .. } => EventKind::Add,
            QueueEvent::Started { .. } => EventKind::Start,
            QueueEvent::Finished { .. } => EventKind::Finish,
            QueueEvent::Failed { .. } => EventKind::Error,
            QueueEvent::Skipped { .. } => EventKind::Skip,
            QueueEvent::RateWait { .. } => EventKind::RateWait,
            QueueEvent::Empty => EventKind::Empty,
            QueueEvent::QueueStarted => EventKind::StartQueue,
            QueueEvent::QueueStopped => EventKind::StopQueue,
        }
    }

    /// The entry this event concerns, if it carries one.
    pub fn entry(&self) -> Option<&EntrySnapshot> {
        match self {
            QueueEvent::Added { entry }
            | QueueEvent::Started { entry }
            | QueueEvent::Finished { entry }
            | QueueEvent::Failed { entry, .. }
            | QueueEvent::Skipped { entry, .. }
            | QueueEvent::RateWait { entry, .. } => Some(entry),
            QueueEvent::Empty | QueueEvent::QueueStarted | QueueEvent::QueueStopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_event_name() {
        let err = "ratelimit".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, QueueError::UnknownEvent(name) if name == "ratelimit"));
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(QueueEvent::Empty.kind(), EventKind::Empty);
        assert_eq!(QueueEvent::QueueStarted.kind(), EventKind::StartQueue);
        assert_eq!(QueueEvent::QueueStopped.kind(), EventKind::StopQueue);
        assert!(QueueEvent::Empty.entry().is_none());
    }
}
