//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::scheduler::RateLimitPolicy;

/// Queue-level configuration.
///
/// The key set is closed: deserializing a config with an unrecognized key
/// fails (`deny_unknown_fields`), matching the validating option merge of
/// the original design. Every field has a default, so `{}` is a valid
/// config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// How many entries may be active at once; `None` = unbounded.
    pub concurrency_limit: Option<usize>,

    /// Keep finished entries queryable (and visible to duplicate detection).
    pub retain_completed: bool,

    /// Start dispatching immediately, or wait for an explicit `start()`.
    pub auto_start: bool,

    /// Priority given to entries that do not specify one. Lower = more
    /// urgent.
    pub default_priority: i64,

    /// Emit info-level progress messages for each entry.
    pub logging: bool,

    /// Resolve a failed action's ticket with the error payload instead of
    /// rejecting it.
    pub catch_errors: bool,

    /// Skip a submission whose key is already pending, active, or retained.
    pub skip_duplicate_keys: bool,

    /// Treat a duplicate skip as an error rather than a resolved skip.
    pub error_on_duplicate: bool,

    /// Master switch for rate limiting.
    pub rate_limit_enabled: bool,

    /// Sliding-window length in milliseconds.
    pub rate_limit_window_ms: u64,

    /// Max dispatches within one window.
    pub rate_limit_max_per_window: u32,

    /// Minimum gap between any two consecutive dispatches, in milliseconds.
    pub min_inter_call_delay_ms: u64,

    /// Floor on any computed rate-limit wait, in milliseconds. Absorbs
    /// scheduling jitter on very short waits.
    pub min_wait_floor_ms: u64,

    /// A recomputed wait target within this many milliseconds of the
    /// previous one is not counted as a new attempt (and emits no fresh
    /// `ratewait` event).
    pub new_attempt_epsilon_ms: u64,

    /// Name used in log messages; useful when running several queues.
    pub instance_name: String,

    /// Key given to entries that do not specify one.
    pub default_key: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            retain_completed: false,
            auto_start: true,
            default_priority: 100,
            logging: false,
            catch_errors: false,
            skip_duplicate_keys: false,
            error_on_duplicate: false,
            rate_limit_enabled: false,
            rate_limit_window_ms: 60_000,
            rate_limit_max_per_window: 1,
            min_inter_call_delay_ms: 0,
            min_wait_floor_ms: 10,
            new_attempt_epsilon_ms: 0,
            instance_name: "trickleq".to_string(),
            default_key: None,
        }
    }
}

impl QueueConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency_limit == Some(0) {
            return Err(QueueError::InvalidConfig(
                "concurrency_limit must be at least 1 (use None for unbounded)".to_string(),
            ));
        }
        Ok(())
    }

    /// Sliding-window length as a `Duration`.
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// Minimum inter-call delay as a `Duration`.
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_inter_call_delay_ms)
    }

    /// Minimum wait floor as a `Duration`.
    pub fn min_wait_floor(&self) -> Duration {
        Duration::from_millis(self.min_wait_floor_ms)
    }

    /// New-attempt epsilon as a `Duration`.
    pub fn new_attempt_epsilon(&self) -> Duration {
        Duration::from_millis(self.new_attempt_epsilon_ms)
    }

    pub(crate) fn rate_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            enabled: self.rate_limit_enabled,
            window: self.rate_window(),
            max_per_window: self.rate_limit_max_per_window,
            min_delay: self.min_delay(),
        }
    }
}
