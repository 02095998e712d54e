//! Task history: the list of every task known to the server.
//!
//! [`HistoryPoller`] re-fetches `GET /tasks` on a fixed period, plus once
//! immediately at start and whenever the selected task changes. The list
//! lives in a [`TaskHistory`] cache mutated only by the poller and is
//! published on a [`tokio::sync::watch`] channel.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vacal_core::task::{TaskListEntry, TaskSummary};
use vacal_core::types::{TaskId, Timestamp};

use crate::config::DEFAULT_HISTORY_INTERVAL_MS;
use crate::error::ClientError;
use crate::events::{self, ClientEvent};
use crate::gate::{RequestGate, Ticket};
use crate::registry::TaskRegistry;

#[derive(Debug, Clone)]
pub struct HistoryPollerConfig {
    pub interval: Duration,
}

impl Default for HistoryPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HISTORY_INTERVAL_MS),
        }
    }
}

/// Local cache of the server's task list.
#[derive(Debug, Default, Clone)]
pub struct TaskHistory {
    entries: Vec<TaskSummary>,
}

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<TaskSummary> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[TaskSummary] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the cache with `list`, in server order.
    ///
    /// Ids already known keep their `first_seen`; new ids are stamped
    /// with `now`.
    pub fn refresh(&mut self, list: Vec<TaskListEntry>, now: Timestamp) {
        let entries = list
            .into_iter()
            .map(|entry| {
                let first_seen = self
                    .entries
                    .iter()
                    .find(|known| known.task_id == entry.task_id)
                    .map(|known| known.first_seen)
                    .unwrap_or(now);
                TaskSummary {
                    task_id: entry.task_id,
                    status: entry.status,
                    first_seen,
                }
            })
            .collect();
        self.entries = entries;
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

struct Shared {
    gate: RequestGate,
    history: Mutex<TaskHistory>,
    list: watch::Sender<Vec<TaskSummary>>,
    events: broadcast::Sender<ClientEvent>,
    /// Deletes sent but not yet answered. List responses are not applied
    /// while this is non-zero.
    pending_clears: AtomicUsize,
}

impl Shared {
    fn history(&self) -> MutexGuard<'_, TaskHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Empty the cache and publish the empty list, invalidating every
    /// list request still in flight.
    fn reset(&self) {
        self.gate.invalidate_with(|| {
            self.history().invalidate();
            self.list.send_replace(Vec::new());
        });
    }
}

/// Marks a delete as pending for as long as it lives.
struct PendingClear(Arc<Shared>);

impl PendingClear {
    fn new(shared: Arc<Shared>) -> Self {
        shared.pending_clears.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for PendingClear {
    fn drop(&mut self) {
        self.0.pending_clears.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps the task history in sync with the server.
///
/// Must be started from inside a Tokio runtime. Dropping the poller stops
/// its loop.
pub struct HistoryPoller {
    registry: Arc<dyn TaskRegistry>,
    shared: Arc<Shared>,
    selected: Option<TaskId>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl HistoryPoller {
    pub fn start(registry: Arc<dyn TaskRegistry>, config: HistoryPollerConfig) -> Self {
        Self::start_with_events(registry, config, events::channel())
    }

    /// Start a poller that reports to an existing event channel.
    pub fn start_with_events(
        registry: Arc<dyn TaskRegistry>,
        config: HistoryPollerConfig,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (list, _) = watch::channel(Vec::new());
        let shared = Arc::new(Shared {
            gate: RequestGate::new(),
            history: Mutex::new(TaskHistory::new()),
            list,
            events,
            pending_clears: AtomicUsize::new(0),
        });
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_history_loop(
            Arc::clone(&registry),
            Arc::clone(&shared),
            Arc::clone(&refresh),
            config.interval,
            cancel.clone(),
        ));

        Self {
            registry,
            shared,
            selected: None,
            refresh,
            cancel,
            handle,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<TaskSummary>> {
        self.shared.list.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Current contents of the cache.
    pub fn snapshot(&self) -> Vec<TaskSummary> {
        self.shared.history().snapshot()
    }

    pub fn selected(&self) -> Option<&TaskId> {
        self.selected.as_ref()
    }

    /// Record the selected task. Any change triggers an immediate refresh
    /// so a just-submitted task shows up without waiting for the next tick.
    pub fn select(&mut self, task_id: Option<TaskId>) {
        if self.selected == task_id {
            return;
        }
        self.selected = task_id;
        self.refresh.notify_one();
    }

    /// Request an out-of-band refresh.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Clear the history.
    ///
    /// The local list is emptied and published before this returns. The
    /// returned future sends `DELETE /tasks` and resolves with the
    /// server's confirmation. Whatever the outcome, the list stays empty:
    /// list responses arriving while the delete is pending are discarded.
    pub fn clear(&self) -> impl Future<Output = Result<(), ClientError>> + Send + 'static {
        let pending = PendingClear::new(Arc::clone(&self.shared));
        self.shared.reset();
        events::emit(&self.shared.events, ClientEvent::HistoryCleared);
        tracing::info!("Task history cleared locally");

        let registry = Arc::clone(&self.registry);
        let cancel = self.cancel.child_token();

        async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = registry.clear_tasks() => result,
            };
            let shared = Arc::clone(&pending.0);
            shared.reset();
            drop(pending);

            match result {
                Ok(()) => {
                    tracing::info!("Server confirmed task history clear");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Server did not confirm task history clear");
                    events::emit(
                        &shared.events,
                        ClientEvent::ClearFailed {
                            error: e.to_string(),
                        },
                    );
                    Err(e.into())
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the poll loop and abandon in-flight requests.
    pub fn shutdown(&self) {
        tracing::info!("Stopping history poll");
        self.cancel.cancel();
    }
}

impl Drop for HistoryPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_history_loop(
    registry: Arc<dyn TaskRegistry>,
    shared: Arc<Shared>,
    refresh: Arc<Notify>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Starting history poll");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => {
                tracing::debug!("Out-of-band history refresh");
            }
        }

        let ticket = shared.gate.issue();
        tokio::spawn(fetch_list(
            Arc::clone(&registry),
            Arc::clone(&shared),
            ticket,
            cancel.child_token(),
        ));
    }

    tracing::debug!("History poll loop exited");
}

async fn fetch_list(
    registry: Arc<dyn TaskRegistry>,
    shared: Arc<Shared>,
    ticket: Ticket,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = registry.list_tasks() => result,
    };

    match result {
        Ok(list) => {
            let mut count = None;
            shared.gate.apply(ticket, || {
                if shared.pending_clears.load(Ordering::SeqCst) > 0 {
                    return;
                }
                let mut history = shared.history();
                history.refresh(list, Utc::now());
                count = Some(history.len());
                shared.list.send_replace(history.snapshot());
            });
            match count {
                Some(count) => {
                    tracing::debug!(count, seq = ticket.seq(), "Task history refreshed");
                    events::emit(&shared.events, ClientEvent::HistoryRefreshed { count });
                }
                None => {
                    tracing::debug!(seq = ticket.seq(), "Discarding stale history response");
                }
            }
        }
        Err(e) => {
            if shared.gate.is_current(ticket) {
                tracing::warn!(error = %e, "Failed to fetch task history");
                events::emit(
                    &shared.events,
                    ClientEvent::PollFailed {
                        task_id: None,
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}
