//! Queue entries and their lifecycle state
//!
//! An [`EntrySnapshot`] describes one submitted unit of work: identity, key,
//! priority, lifecycle timestamps, and rate-limit wait bookkeeping. Snapshots
//! are handed to actions, carried on events, and returned from inspection
//! methods; derived durations are computed from the timestamps rather than
//! stored.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::QueueConfig;

/// Identity of a submitted entry.
///
/// Assigned at submission from a monotonically increasing counter starting at
/// 1; never reused. Doubles as the FIFO tie-breaker within a priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl EntryId {
    /// The raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Waiting in the dispatch queue (including rate-limit waits).
    Queued,
    /// Action is running.
    Active,
    /// Action settled successfully.
    Finished,
    /// Action settled with an error.
    Error,
    /// Suppressed as a duplicate key; never enqueued.
    Skipped,
}

/// Per-submission overrides of the queue-level defaults.
///
/// Any field left `None` falls back to the corresponding [`QueueConfig`]
/// value. Concurrency is queue-global and cannot be overridden per entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntryOptions {
    pub priority: Option<i64>,
    pub key: Option<String>,
    pub catch_errors: Option<bool>,
    pub skip_duplicate_keys: Option<bool>,
    pub error_on_duplicate: Option<bool>,
    pub log: Option<bool>,
}

impl EntryOptions {
    /// Set the duplicate-detection key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the priority (lower value = more urgent).
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Overlay these options on the queue defaults.
    pub(crate) fn resolve(&self, config: &QueueConfig) -> EntrySettings {
        EntrySettings {
            priority: self.priority.unwrap_or(config.default_priority),
            key: self.key.clone().or_else(|| config.default_key.clone()),
            catch_errors: self.catch_errors.unwrap_or(config.catch_errors),
            skip_duplicates: self
                .skip_duplicate_keys
                .unwrap_or(config.skip_duplicate_keys),
            error_on_duplicate: self
                .error_on_duplicate
                .unwrap_or(config.error_on_duplicate),
            log: self.log.unwrap_or(config.logging),
        }
    }
}

/// Effective per-entry settings after merging queue defaults.
#[derive(Debug, Clone)]
pub(crate) struct EntrySettings {
    pub priority: i64,
    pub key: Option<String>,
    pub catch_errors: bool,
    pub skip_duplicates: bool,
    pub error_on_duplicate: bool,
    pub log: bool,
}

/// The observable state of one submitted entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub key: Option<String>,
    /// Lower value = more urgent.
    pub priority: i64,
    pub status: EntryStatus,
    pub skipped: bool,
    pub queued_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    /// When the current/last rate-limit wait episode began.
    pub wait_started_at: Option<Instant>,
    pub wait_finished_at: Option<Instant>,
    /// Total rate-limit delay accumulated before dispatch.
    pub wait_time: Duration,
    /// Count of distinct rate-limit wait episodes.
    pub attempts: u32,
    /// Target instant of the wait in progress; a materially different target
    /// counts as a new attempt.
    pub(crate) wait_until: Option<Instant>,
    pub(crate) catch_errors: bool,
    pub(crate) log: bool,
}

impl EntrySnapshot {
    pub(crate) fn new(id: EntryId, settings: &EntrySettings, now: Instant) -> Self {
        Self {
            id,
            key: settings.key.clone(),
            priority: settings.priority,
            status: EntryStatus::Queued,
            skipped: false,
            queued_at: now,
            started_at: None,
            finished_at: None,
            wait_started_at: None,
            wait_finished_at: None,
            wait_time: Duration::ZERO,
            attempts: 0,
            wait_until: None,
            catch_errors: settings.catch_errors,
            log: settings.log,
        }
    }

    /// Queue-wait time: how long the entry sat queued before its action
    /// started. `None` until the entry has started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|s| s.duration_since(self.queued_at))
    }

    /// Execution time of the action. `None` until the entry has settled.
    pub fn run_time(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished.duration_since(started)),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn snapshot_for_tests(id: u64, priority: i64) -> EntrySnapshot {
    let settings = EntrySettings {
        priority,
        key: None,
        catch_errors: false,
        skip_duplicates: false,
        error_on_duplicate: false,
        log: false,
    };
    EntrySnapshot::new(EntryId(id), &settings, Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_overlays_defaults() {
        let config = QueueConfig {
            default_priority: 100,
            catch_errors: true,
            ..Default::default()
        };
        let opts = EntryOptions::default().with_priority(5).with_key("k");
        let settings = opts.resolve(&config);
        assert_eq!(settings.priority, 5);
        assert_eq!(settings.key.as_deref(), Some("k"));
        assert!(settings.catch_errors);
        assert!(!settings.skip_duplicates);
    }

    #[test]
    fn test_resolve_uses_default_key() {
        let config = QueueConfig {
            default_key: Some("shared".to_string()),
            ..Default::default()
        };
        let settings = EntryOptions::default().resolve(&config);
        assert_eq!(settings.key.as_deref(), Some("shared"));
        // An explicit key wins over the default.
        let settings = EntryOptions::default().with_key("own").resolve(&config);
        assert_eq!(settings.key.as_deref(), Some("own"));
    }

    #[test]
    fn test_derived_durations() {
        let mut entry = snapshot_for_tests(1, 100);
        assert_eq!(entry.elapsed(), None);
        assert_eq!(entry.run_time(), None);

        let started = entry.queued_at + Duration::from_millis(250);
        let finished = started + Duration::from_millis(1000);
        entry.started_at = Some(started);
        entry.finished_at = Some(finished);

        assert_eq!(entry.elapsed(), Some(Duration::from_millis(250)));
        assert_eq!(entry.run_time(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_unknown_entry_option_rejected() {
        let err = serde_json::from_value::<EntryOptions>(serde_json::json!({
            "priority": 1,
            "concurrency": 4,
        }));
        assert!(err.is_err());
    }
}
