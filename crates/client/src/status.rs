//! Status poller for the currently selected task.
//!
//! [`StatusPoller`] owns one polling loop at a time, tied one-to-one to
//! the watched task id. Selecting an id fetches immediately and then on a
//! fixed period; changing or clearing the id cancels the loop and
//! invalidates every request still in flight, so nothing from the old id
//! is published after the switch.
//!
//! Snapshots are published on a [`tokio::sync::watch`] channel. Call
//! [`StatusPoller::subscribe`] to observe them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vacal_core::task::Task;
use vacal_core::types::TaskId;

use crate::config::DEFAULT_STATUS_INTERVAL_MS;
use crate::events::{self, ClientEvent};
use crate::gate::{RequestGate, Ticket};
use crate::registry::TaskRegistry;

/// What the loop does once the watched task reaches a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminalPolicy {
    /// Keep re-querying at the same cadence until the id changes.
    #[default]
    KeepPolling,
    /// Stop issuing requests after a terminal snapshot is published.
    StopOnTerminal,
}

#[derive(Debug, Clone)]
pub struct StatusPollerConfig {
    pub interval: Duration,
    pub terminal_policy: TerminalPolicy,
}

impl Default for StatusPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_STATUS_INTERVAL_MS),
            terminal_policy: TerminalPolicy::default(),
        }
    }
}

/// State shared between the poller handle and its loop.
struct Shared {
    gate: RequestGate,
    snapshot: watch::Sender<Option<Task>>,
    events: broadcast::Sender<ClientEvent>,
}

/// Bookkeeping for the loop of the currently watched id.
struct PollSession {
    task_id: TaskId,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Polls `GET /tasks/{id}` for the watched task.
///
/// Must be driven from inside a Tokio runtime. Dropping the poller stops
/// its loop.
pub struct StatusPoller {
    registry: Arc<dyn TaskRegistry>,
    config: StatusPollerConfig,
    shared: Arc<Shared>,
    session: Option<PollSession>,
}

impl StatusPoller {
    pub fn new(registry: Arc<dyn TaskRegistry>, config: StatusPollerConfig) -> Self {
        Self::with_events(registry, config, events::channel())
    }

    /// Create a poller that reports to an existing event channel.
    pub fn with_events(
        registry: Arc<dyn TaskRegistry>,
        config: StatusPollerConfig,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            registry,
            config,
            shared: Arc::new(Shared {
                gate: RequestGate::new(),
                snapshot,
                events,
            }),
            session: None,
        }
    }

    /// Receive every published snapshot. `None` means nothing is known
    /// about the watched id yet (or no id is watched).
    pub fn subscribe(&self) -> watch::Receiver<Option<Task>> {
        self.shared.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Option<Task> {
        self.shared.snapshot.borrow().clone()
    }

    pub fn watched(&self) -> Option<&TaskId> {
        self.session.as_ref().map(|s| &s.task_id)
    }

    /// `true` while a loop is running for the watched id.
    pub fn is_polling(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    /// Change the watched task id.
    ///
    /// Re-selecting the id already watched is a no-op. Any other change
    /// cancels the running loop, clears the published snapshot, and (for
    /// `Some`) starts a fresh loop with an immediate fetch.
    pub fn watch(&mut self, task_id: Option<TaskId>) {
        if self.watched() == task_id.as_ref() {
            return;
        }

        self.stop_session();
        let shared = Arc::clone(&self.shared);
        self.shared.gate.invalidate_with(|| {
            shared.snapshot.send_replace(None);
        });

        let Some(task_id) = task_id else {
            return;
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poll_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.shared),
            task_id.clone(),
            self.config.clone(),
            cancel.clone(),
        ));
        self.session = Some(PollSession {
            task_id,
            cancel,
            handle,
        });
    }

    /// Stop polling and forget the watched id.
    pub fn shutdown(&mut self) {
        self.watch(None);
    }

    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(task_id = %session.task_id, "Stopping status poll");
            session.cancel.cancel();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Tick loop for one watched id. Each tick dispatches its request
/// independently so a slow response never delays the cadence.
async fn run_poll_loop(
    registry: Arc<dyn TaskRegistry>,
    shared: Arc<Shared>,
    task_id: TaskId,
    config: StatusPollerConfig,
    cancel: CancellationToken,
) {
    tracing::info!(
        task_id = %task_id,
        interval_ms = config.interval.as_millis() as u64,
        "Starting status poll",
    );

    // Cancelled once a terminal snapshot is published under StopOnTerminal.
    let finished = cancel.child_token();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = finished.cancelled() => break,
            _ = ticker.tick() => {
                let ticket = shared.gate.issue();
                tokio::spawn(fetch_once(
                    Arc::clone(&registry),
                    Arc::clone(&shared),
                    task_id.clone(),
                    ticket,
                    config.terminal_policy,
                    finished.clone(),
                ));
            }
        }
    }

    tracing::debug!(task_id = %task_id, "Status poll loop exited");
}

/// Outcome of offering a response to the gate.
enum Applied {
    Published { terminal: bool },
    Regression,
    Stale,
}

async fn fetch_once(
    registry: Arc<dyn TaskRegistry>,
    shared: Arc<Shared>,
    task_id: TaskId,
    ticket: Ticket,
    policy: TerminalPolicy,
    finished: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = finished.cancelled() => return,
        result = registry.get_task(&task_id) => result,
    };

    match result {
        Ok(task) => {
            let status = task.status.clone();
            match offer(&shared, ticket, task) {
                Applied::Published { terminal } => {
                    tracing::debug!(task_id = %task_id, status = %status, seq = ticket.seq(), "Task status updated");
                    events::emit(
                        &shared.events,
                        ClientEvent::TaskUpdated {
                            task_id: task_id.clone(),
                            status,
                        },
                    );
                    if terminal && policy == TerminalPolicy::StopOnTerminal {
                        tracing::info!(task_id = %task_id, "Task is terminal, stopping status poll");
                        finished.cancel();
                    }
                }
                Applied::Regression => {
                    tracing::warn!(
                        task_id = %task_id,
                        status = %status,
                        "Ignoring non-terminal status reported after a terminal one",
                    );
                }
                Applied::Stale => {
                    tracing::debug!(task_id = %task_id, seq = ticket.seq(), "Discarding stale status response");
                }
            }
        }
        Err(e) => {
            if shared.gate.is_current(ticket) {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to fetch task status");
                events::emit(
                    &shared.events,
                    ClientEvent::PollFailed {
                        task_id: Some(task_id),
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}

/// Publish `task` if its ticket is the freshest for the watched id.
///
/// A terminal snapshot is never replaced by a non-terminal one.
fn offer(shared: &Shared, ticket: Ticket, task: Task) -> Applied {
    let mut outcome = Applied::Stale;
    shared.gate.apply(ticket, || {
        let regresses = shared
            .snapshot
            .borrow()
            .as_ref()
            .is_some_and(|current| current.is_terminal() && !task.is_terminal());
        if regresses {
            outcome = Applied::Regression;
        } else {
            outcome = Applied::Published {
                terminal: task.is_terminal(),
            };
            shared.snapshot.send_replace(Some(task));
        }
    });
    outcome
}
