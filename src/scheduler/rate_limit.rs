//! Rate-limit history and admission arithmetic
//!
//! The queue keeps a time-ordered ledger of past dispatch instants. Two
//! independent constraints are measured against it: a cap on dispatches per
//! sliding window, and a minimum spacing between any two consecutive
//! dispatches. Both are computed from recorded history, never from a
//! predicted schedule.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::entry::EntryId;

/// Effective rate-limit parameters, derived from the queue config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitPolicy {
    pub enabled: bool,
    pub window: Duration,
    pub max_per_window: u32,
    pub min_delay: Duration,
}

impl RateLimitPolicy {
    /// Rate limiting is off, or configured so nothing can ever block.
    fn is_vacuous(&self) -> bool {
        !self.enabled || (self.max_per_window == 0 && self.min_delay.is_zero())
    }
}

/// One dispatch, as remembered for future admission decisions. Never
/// mutated after recording.
#[derive(Debug, Clone)]
pub(crate) struct RateLimitRecord {
    pub started_at: Instant,
    pub id: EntryId,
    pub key: Option<String>,
}

/// Append-only ledger of dispatch instants, oldest first.
#[derive(Debug, Default)]
pub(crate) struct RateLimitHistory {
    records: Vec<RateLimitRecord>,
}

impl RateLimitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a dispatch. Records must be appended in time order.
    pub fn record(&mut self, started_at: Instant, id: EntryId, key: Option<String>) {
        let record = RateLimitRecord {
            started_at,
            id,
            key,
        };
        trace!(id = %record.id, key = ?record.key, "RateLimitHistory::record");
        self.records.push(record);
    }

    fn in_window(record: &RateLimitRecord, now: Instant, policy: &RateLimitPolicy) -> bool {
        !policy.window.is_zero() && now.duration_since(record.started_at) < policy.window
    }

    fn too_soon(record: &RateLimitRecord, now: Instant, policy: &RateLimitPolicy) -> bool {
        record.started_at + policy.min_delay >= now
    }

    /// Records still inside the sliding window.
    pub fn calls_in_window(&self, now: Instant, policy: &RateLimitPolicy) -> Vec<&RateLimitRecord> {
        self.records
            .iter()
            .filter(|r| Self::in_window(r, now, policy))
            .collect()
    }

    /// Records still inside the minimum inter-call delay.
    pub fn calls_in_delay(&self, now: Instant, policy: &RateLimitPolicy) -> Vec<&RateLimitRecord> {
        self.records
            .iter()
            .filter(|r| Self::too_soon(r, now, policy))
            .collect()
    }

    /// When the next dispatch becomes legal.
    ///
    /// `None` means eligible now. Otherwise the result is the later of
    /// "the minimum delay has elapsed since the most recent call" and "the
    /// newest window-blocking call has left the window".
    pub fn next_eligible(&self, now: Instant, policy: &RateLimitPolicy) -> Option<Instant> {
        if policy.is_vacuous() {
            return None;
        }

        let in_window = self.calls_in_window(now, policy);
        let too_soon = self.calls_in_delay(now, policy);
        if in_window.is_empty() && too_soon.is_empty() {
            return None;
        }
        if too_soon.is_empty() && (in_window.len() as u32) < policy.max_per_window {
            return None;
        }

        let delay_clears = too_soon.last().map(|r| r.started_at + policy.min_delay);
        let window_clears = in_window.last().map(|r| r.started_at + policy.window);
        let next = delay_clears.max(window_clears);
        trace!(?delay_clears, ?window_clears, "RateLimitHistory::next_eligible");
        next
    }

    /// Drop records that can no longer block anything. Housekeeping only;
    /// admission decisions are correct with or without it.
    pub fn prune(&mut self, now: Instant, policy: &RateLimitPolicy) {
        self.records
            .retain(|r| Self::in_window(r, now, policy) || Self::too_soon(r, now, policy));
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
