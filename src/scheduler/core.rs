//! The queue core: admission, dispatch, and settlement
//!
//! `Queue` owns the dispatch queue, the active set, the retained set, and
//! the rate-limit history behind one mutex. `service()` is the single
//! re-entrant scheduling function: it is invoked after every submission,
//! every settlement, and every rate-limit retry timer, and each invocation
//! re-reads current state under the lock, so interleaved triggers cannot
//! dispatch the same entry twice.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::eyre;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::clock::RetryTimer;
use crate::config::QueueConfig;
use crate::entry::{EntryId, EntryOptions, EntrySnapshot, EntryStatus};
use crate::error::QueueError;
use crate::events::{EventBus, EventKind, ListenerHandle, QueueEvent};

use super::dispatch::{DispatchQueue, Pending};
use super::rate_limit::RateLimitHistory;

/// The boxed future an action produces.
pub type ActionFuture<T> = BoxFuture<'static, eyre::Result<T>>;

type Action<T> = Box<dyn FnOnce(EntrySnapshot) -> ActionFuture<T> + Send>;

type ResultSender<T> = oneshot::Sender<Result<Completion<T>, QueueError>>;

/// What a settled submission resolves to.
///
/// - success: `result` is `Some`, `error` is `None`;
/// - failure with `catch_errors`: `result` is `None`, `error` carries the
///   action's report;
/// - duplicate skip: `entry.skipped` is set, `error` explains the skip;
/// - removal before dispatch: both `result` and `error` are `None`.
#[derive(Debug)]
pub struct Completion<T> {
    pub entry: EntrySnapshot,
    pub result: Option<T>,
    pub error: Option<eyre::Report>,
}

/// The pending result of one submission.
///
/// Await it (or call [`Ticket::done`]) to get the settlement. The entry id
/// is available up front for [`Queue::remove`].
#[derive(Debug)]
pub struct Ticket<T> {
    id: EntryId,
    rx: oneshot::Receiver<Result<Completion<T>, QueueError>>,
}

impl<T> Ticket<T> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Wait for the entry to settle.
    pub async fn done(self) -> Result<Completion<T>, QueueError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::ChannelClosed(self.id)),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Ticket<T> {
    type Output = Result<Completion<T>, QueueError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.done())
    }
}

/// What travels with a pending entry until dispatch: its action and the
/// channel its ticket resolves through. The sender is consumed exactly once
/// (settlement, skip, or removal), which is what makes double-fulfilment
/// unrepresentable.
struct Wiring<T> {
    action: Action<T>,
    tx: ResultSender<T>,
}

struct Inner<T> {
    paused: bool,
    pending: DispatchQueue<Wiring<T>>,
    active: Vec<EntrySnapshot>,
    retained: Vec<EntrySnapshot>,
    history: RateLimitHistory,
    retry: RetryTimer,
}

struct Shared<T> {
    config: QueueConfig,
    bus: EventBus,
    counter: AtomicU64,
    inner: Mutex<Inner<T>>,
}

/// An in-process task queue with priority ordering, a concurrency gate,
/// optional rate limiting, and optional duplicate-key suppression.
///
/// `Queue` is a cheap-clone handle; clones share state. Actions run as
/// spawned tasks, so "concurrency" is interleaved suspension on one
/// runtime, not parallel threads.
pub struct Queue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Queue<T> {
    /// A queue with default configuration (unbounded concurrency, no rate
    /// limiting, auto-started).
    pub fn new() -> Self {
        Self::from_config(QueueConfig::default())
    }

    /// A queue with the given configuration.
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: QueueConfig) -> Self {
        debug!(name = %config.instance_name, "Queue::from_config");
        let paused = !config.auto_start;
        Self {
            shared: Arc::new(Shared {
                config,
                bus: EventBus::new(),
                counter: AtomicU64::new(0),
                inner: Mutex::new(Inner {
                    paused,
                    pending: DispatchQueue::new(),
                    active: Vec::new(),
                    retained: Vec::new(),
                    history: RateLimitHistory::new(),
                    retry: RetryTimer::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    // === Submission ===

    /// Submit an action with default options.
    pub async fn add<F, Fut>(&self, action: F) -> Ticket<T>
    where
        F: FnOnce(EntrySnapshot) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        self.add_with(action, EntryOptions::default()).await
    }

    /// Submit an action with per-entry option overrides.
    ///
    /// The returned [`Ticket`] resolves when the entry settles. If
    /// duplicate-key suppression applies, the entry never reaches the
    /// dispatch queue: its ticket resolves (or rejects, per
    /// `error_on_duplicate`) immediately and a `skip` (or `error`) event
    /// fires before this method returns.
    pub async fn add_with<F, Fut>(&self, action: F, options: EntryOptions) -> Ticket<T>
    where
        F: FnOnce(EntrySnapshot) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let settings = options.resolve(&self.shared.config);
        let id = EntryId(self.shared.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Instant::now();
        let mut entry = EntrySnapshot::new(id, &settings, now);
        debug!(%id, key = ?entry.key, priority = entry.priority, "Queue::add_with");

        let (tx, rx) = oneshot::channel();
        let ticket = Ticket { id, rx };
        let action: Action<T> = Box::new(move |entry| {
            let fut: ActionFuture<T> = Box::pin(action(entry));
            fut
        });

        let mut inner = self.shared.inner.lock().await;
        if settings.skip_duplicates && Self::key_known(&inner, entry.key.as_deref()) {
            drop(inner);
            entry.status = EntryStatus::Skipped;
            entry.skipped = true;
            self.progress(&entry, "skipped as duplicate");
            let message = format!(
                "entry {} was skipped because of duplicate key {:?}",
                entry.id, entry.key
            );
            // Resolve the ticket before fanning out the event.
            if settings.error_on_duplicate {
                let _ = tx.send(Err(QueueError::DuplicateKey {
                    entry: entry.clone(),
                }));
                self.shared.bus.emit(&QueueEvent::Failed { entry, message });
            } else {
                let _ = tx.send(Ok(Completion {
                    entry: entry.clone(),
                    result: None,
                    error: Some(eyre!(message.clone())),
                }));
                self.shared.bus.emit(&QueueEvent::Skipped { entry, message });
            }
            return ticket;
        }

        inner.pending.insert(Pending {
            entry: entry.clone(),
            payload: Wiring { action, tx },
        });
        self.progress(&entry, "added to queue");
        // Emitted before the lock is released, so a concurrent dispatch on
        // another worker cannot announce `start` ahead of `add`.
        self.shared.bus.emit(&QueueEvent::Added { entry });
        drop(inner);

        self.service().await;
        ticket
    }

    fn key_known(inner: &Inner<T>, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return false;
        };
        inner
            .pending
            .iter()
            .any(|item| item.entry.key.as_deref() == Some(key))
            || inner.active.iter().any(|e| e.key.as_deref() == Some(key))
            || inner.retained.iter().any(|e| e.key.as_deref() == Some(key))
    }

    // === The admission/dispatch loop ===

    /// Attempt dispatch until no more progress can be made.
    ///
    /// Safe to call from any trigger at any time: each pass re-evaluates
    /// paused state, queue contents, the concurrency gate, and rate-limit
    /// eligibility under the lock. Either an entry is dispatched (and the
    /// loop tries again), a retry timer is scheduled for a rate-limit wait,
    /// or nothing happens.
    ///
    /// Boxed so the settlement and retry-timer paths can re-invoke it
    /// without naming a recursive future type.
    fn service(&self) -> BoxFuture<'static, ()> {
        let queue = self.clone();
        Box::pin(async move { queue.service_loop().await })
    }

    async fn service_loop(&self) {
        loop {
            let mut inner = self.shared.inner.lock().await;
            if inner.paused || inner.pending.is_empty() || !self.has_room(inner.active.len()) {
                return;
            }

            let now = Instant::now();
            let policy = self.shared.config.rate_policy();
            // A non-future eligibility instant counts as eligible now: the
            // min-delay comparison is inclusive at the boundary, so waiting
            // for it again would recompute the same instant forever.
            let eligible = inner
                .history
                .next_eligible(now, &policy)
                .filter(|&at| at > now);
            match eligible {
                None => {
                    let Some(mut item) = inner.pending.pop_head() else {
                        return;
                    };
                    item.entry.status = EntryStatus::Active;
                    item.entry.started_at = Some(now);
                    if let Some(wait_started) = item.entry.wait_started_at {
                        item.entry.wait_finished_at = Some(now);
                        item.entry.wait_time = now.duration_since(wait_started);
                    }
                    inner
                        .history
                        .record(now, item.entry.id, item.entry.key.clone());
                    inner.active.push(item.entry.clone());
                    drop(inner);

                    debug!(id = %item.entry.id, key = ?item.entry.key, "Queue::service: dispatching");
                    self.progress(&item.entry, "starting");
                    self.shared.bus.emit(&QueueEvent::Started {
                        entry: item.entry.clone(),
                    });

                    let queue = self.clone();
                    let Pending { entry, payload } = item;
                    let Wiring { action, tx } = payload;
                    tokio::spawn(async move {
                        let entry_for_action = entry.clone();
                        let task = tokio::spawn(async move { action(entry_for_action).await });
                        let result = match task.await {
                            Ok(result) => result,
                            Err(join_error) => Err(eyre!("action panicked: {join_error}")),
                        };
                        queue.settle(entry, result, tx).await;
                    });
                    continue;
                }
                Some(eligible) => {
                    let epsilon = self.shared.config.new_attempt_epsilon();
                    let until = eligible.max(now + self.shared.config.min_wait_floor());
                    let wait = until.duration_since(now);
                    let announce = {
                        let Some(head) = inner.pending.head_mut() else {
                            return;
                        };
                        if head.entry.wait_started_at.is_none() {
                            head.entry.wait_started_at = Some(now);
                        }
                        let new_target = match head.entry.wait_until {
                            None => true,
                            Some(previous) => {
                                let drift = previous
                                    .duration_since(until)
                                    .max(until.duration_since(previous));
                                drift > epsilon
                            }
                        };
                        if new_target {
                            head.entry.attempts += 1;
                            head.entry.wait_until = Some(until);
                            Some(head.entry.clone())
                        } else {
                            None
                        }
                    };

                    // Re-arm even when the target has not moved: the timer
                    // for that target may have just fired and been consumed.
                    // The epsilon only dedups the attempt count and the
                    // ratewait announcement.
                    let queue = self.clone();
                    inner.retry.schedule(wait, move || queue.service());

                    if let Some(entry) = announce {
                        debug!(
                            id = %entry.id,
                            ?wait,
                            attempts = entry.attempts,
                            "Queue::service: rate limited, scheduling retry"
                        );
                        self.shared.bus.emit(&QueueEvent::RateWait { entry, wait });
                    }
                    return;
                }
            }
        }
    }

    /// Record a settlement, resolve the ticket, and service the queue again.
    async fn settle(&self, mut entry: EntrySnapshot, result: eyre::Result<T>, tx: ResultSender<T>) {
        let now = Instant::now();
        entry.finished_at = Some(now);
        entry.status = if result.is_ok() {
            EntryStatus::Finished
        } else {
            EntryStatus::Error
        };
        debug!(id = %entry.id, status = ?entry.status, "Queue::settle");

        let mut inner = self.shared.inner.lock().await;
        if let Some(position) = inner.active.iter().position(|e| e.id == entry.id) {
            inner.active.remove(position);
        }
        if self.shared.config.retain_completed {
            inner.retained.push(entry.clone());
        }
        let empty = inner.active.is_empty() && inner.pending.is_empty();
        drop(inner);

        match result {
            Ok(value) => {
                self.progress(&entry, "finished");
                self.shared.bus.emit(&QueueEvent::Finished {
                    entry: entry.clone(),
                });
                if empty {
                    self.shared.bus.emit(&QueueEvent::Empty);
                }
                let _ = tx.send(Ok(Completion {
                    entry,
                    result: Some(value),
                    error: None,
                }));
            }
            Err(report) => {
                self.progress(&entry, "failed");
                self.shared.bus.emit(&QueueEvent::Failed {
                    entry: entry.clone(),
                    message: report.to_string(),
                });
                if empty {
                    self.shared.bus.emit(&QueueEvent::Empty);
                }
                let outcome = if entry.catch_errors {
                    Ok(Completion {
                        entry,
                        result: None,
                        error: Some(report),
                    })
                } else {
                    Err(QueueError::ActionFailed { entry, error: report })
                };
                let _ = tx.send(outcome);
            }
        }

        self.service().await;
    }

    fn has_room(&self, active: usize) -> bool {
        match self.shared.config.concurrency_limit {
            None => true,
            Some(limit) => active < limit,
        }
    }

    // === Start / stop ===

    /// Resume dispatching and service the queue.
    pub async fn start(&self) {
        debug!("Queue::start");
        {
            let mut inner = self.shared.inner.lock().await;
            inner.paused = false;
        }
        self.shared.bus.emit(&QueueEvent::QueueStarted);
        self.service().await;
    }

    /// Halt new dispatch. Active entries run to completion.
    pub async fn stop(&self) {
        debug!("Queue::stop");
        {
            let mut inner = self.shared.inner.lock().await;
            inner.paused = true;
        }
        self.shared.bus.emit(&QueueEvent::QueueStopped);
    }

    pub async fn is_started(&self) -> bool {
        !self.shared.inner.lock().await.paused
    }

    // === Cancellation and housekeeping ===

    /// Cancel a still-pending entry. Its ticket resolves with an empty
    /// completion; the entry never starts.
    pub async fn remove(&self, id: EntryId) -> Result<EntrySnapshot, QueueError> {
        debug!(%id, "Queue::remove");
        let mut inner = self.shared.inner.lock().await;
        let item = inner.pending.remove(id)?;
        let empty = inner.active.is_empty() && inner.pending.is_empty();
        drop(inner);

        let Pending { entry, payload } = item;
        let Wiring { tx, .. } = payload;
        let _ = tx.send(Ok(Completion {
            entry: entry.clone(),
            result: None,
            error: None,
        }));
        if empty {
            self.shared.bus.emit(&QueueEvent::Empty);
        }
        Ok(entry)
    }

    /// Cancel every pending entry. Active entries are untouched.
    pub async fn clear(&self) {
        debug!("Queue::clear");
        let drained = {
            let mut inner = self.shared.inner.lock().await;
            inner.pending.drain_all()
        };
        for Pending { entry, payload } in drained {
            let Wiring { tx, .. } = payload;
            let _ = tx.send(Ok(Completion {
                entry,
                result: None,
                error: None,
            }));
        }
    }

    /// Forget retained (completed) entries.
    pub async fn clear_retained(&self) {
        self.shared.inner.lock().await.retained.clear();
    }

    /// Forget rate-limit history. The next dispatch is immediately eligible.
    pub async fn clear_rate_limit_history(&self) {
        let mut inner = self.shared.inner.lock().await;
        debug!(records = inner.history.len(), "Queue::clear_rate_limit_history");
        inner.history.clear();
    }

    /// Drop rate-limit records that can no longer block a dispatch.
    pub async fn prune_rate_limit_history(&self) {
        let policy = self.shared.config.rate_policy();
        self.shared
            .inner
            .lock()
            .await
            .history
            .prune(Instant::now(), &policy);
    }

    /// Cancel pending entries and forget retained entries and rate-limit
    /// history. Entries already active keep running; the returned listing
    /// shows what is still in flight.
    pub async fn drain(&self) -> Vec<EntrySnapshot> {
        debug!("Queue::drain");
        self.clear().await;
        self.clear_retained().await;
        self.clear_rate_limit_history().await;
        self.list().await
    }

    // === Inspection ===

    /// How many entries are waiting for dispatch.
    pub async fn queue_size(&self) -> usize {
        self.shared.inner.lock().await.pending.len()
    }

    /// How many entries are currently running.
    pub async fn active_size(&self) -> usize {
        self.shared.inner.lock().await.active.len()
    }

    /// How many completed entries are retained.
    pub async fn retained_size(&self) -> usize {
        self.shared.inner.lock().await.retained.len()
    }

    /// The entry that would be dispatched next, if any.
    pub async fn peek_next(&self) -> Option<EntrySnapshot> {
        self.shared
            .inner
            .lock()
            .await
            .pending
            .peek_head()
            .map(|item| item.entry.clone())
    }

    /// Every known entry: active, then pending, then retained.
    pub async fn list(&self) -> Vec<EntrySnapshot> {
        let inner = self.shared.inner.lock().await;
        inner
            .active
            .iter()
            .cloned()
            .chain(inner.pending.iter().map(|item| item.entry.clone()))
            .chain(inner.retained.iter().cloned())
            .collect()
    }

    /// The first known entry with this key, if any.
    pub async fn get_by_key(&self, key: &str) -> Option<EntrySnapshot> {
        self.list()
            .await
            .into_iter()
            .find(|entry| entry.key.as_deref() == Some(key))
    }

    // === Listeners ===

    /// Register a listener for one event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerHandle
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(kind, listener)
    }

    /// Register a listener by event name (`"finish"`, `"ratewait"`, ...).
    pub fn on_named<F>(&self, name: &str, listener: F) -> Result<ListenerHandle, QueueError>
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        Ok(self.shared.bus.subscribe(name.parse()?, listener))
    }

    /// Remove a listener.
    pub fn off(&self, handle: ListenerHandle) -> Result<(), QueueError> {
        self.shared.bus.unsubscribe(handle)
    }

    /// Remove every listener for `kind`, or all listeners when `None`.
    pub fn clear_listeners(&self, kind: Option<EventKind>) {
        self.shared.bus.clear(kind);
    }

    fn progress(&self, entry: &EntrySnapshot, message: &str) {
        if entry.log {
            info!(
                queue = %self.shared.config.instance_name,
                id = %entry.id,
                key = ?entry.key,
                "{message}"
            );
        }
    }
}
