//! Log consumption for the selected task.
//!
//! [`LogStreamConsumer`] either fetches the whole log once (snapshot) or
//! follows it as the server appends (follow). At most one session is
//! live: starting a new operation, stopping, or changing the task cancels
//! the current one. Each session carries a number and may write to the
//! published [`LogView`] only while that number is current, so output
//! from an abandoned session can never reach the view.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use vacal_core::types::TaskId;

use crate::decoder::Utf8StreamDecoder;
use crate::events::{self, ClientEvent, StreamEnd};
use crate::registry::LogSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPhase {
    #[default]
    Idle,
    /// A snapshot fetch is in flight.
    Loading,
    /// A follow stream is open.
    Following,
}

/// What the log panel shows.
#[derive(Debug, Clone, Default)]
pub struct LogView {
    pub text: String,
    pub phase: LogPhase,
    /// Set when the last operation failed for a reason other than
    /// cancellation.
    pub error: Option<String>,
    session: u64,
}

impl LogView {
    pub fn is_busy(&self) -> bool {
        self.phase != LogPhase::Idle
    }
}

/// Live operation owned by the consumer.
struct StreamSession {
    id: u64,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Fetches or follows the log of one task at a time.
///
/// Operations spawn onto the current Tokio runtime. Dropping the consumer
/// aborts whatever is in flight.
pub struct LogStreamConsumer {
    source: Arc<dyn LogSource>,
    task_id: Option<TaskId>,
    view: Arc<watch::Sender<LogView>>,
    events: broadcast::Sender<ClientEvent>,
    next_session: u64,
    active: Option<StreamSession>,
}

impl LogStreamConsumer {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self::with_events(source, events::channel())
    }

    pub fn with_events(source: Arc<dyn LogSource>, events: broadcast::Sender<ClientEvent>) -> Self {
        let (view, _) = watch::channel(LogView::default());
        Self {
            source,
            task_id: None,
            view: Arc::new(view),
            events,
            next_session: 0,
            active: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LogView> {
        self.view.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> LogView {
        self.view.borrow().clone()
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    /// `true` while a snapshot or follow session is running.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    /// Select the task whose log is shown. A different id aborts the
    /// current operation and resets the view.
    pub fn set_task(&mut self, task_id: Option<TaskId>) {
        if self.task_id == task_id {
            return;
        }
        self.cancel_active();
        let session = self.bump_session();
        self.view.send_replace(LogView {
            session,
            ..LogView::default()
        });
        self.task_id = task_id;
    }

    /// Fetch the complete log and replace the text with it.
    pub fn snapshot(&mut self) {
        let Some((task_id, session, cancel)) = self.begin(LogPhase::Loading) else {
            return;
        };
        let handle = tokio::spawn(run_snapshot(
            Arc::clone(&self.source),
            task_id,
            session,
            Arc::clone(&self.view),
            cancel.clone(),
        ));
        self.active = Some(StreamSession {
            id: session,
            cancel,
            handle,
        });
    }

    /// Open a follow stream. The text is cleared once the server accepts
    /// the request, then grows chunk by chunk.
    pub fn follow(&mut self) {
        let Some((task_id, session, cancel)) = self.begin(LogPhase::Following) else {
            return;
        };
        let handle = tokio::spawn(run_follow(
            Arc::clone(&self.source),
            task_id,
            session,
            Arc::clone(&self.view),
            self.events.clone(),
            cancel.clone(),
        ));
        self.active = Some(StreamSession {
            id: session,
            cancel,
            handle,
        });
    }

    /// Abort the current operation. The text received so far is kept.
    pub fn stop(&mut self) {
        if self.active.is_none() {
            return;
        }
        self.cancel_active();
        let session = self.bump_session();
        self.view.send_modify(|view| {
            view.session = session;
            view.phase = LogPhase::Idle;
            view.error = None;
        });
    }

    /// Cancel the prior session and claim a new one for `phase`.
    fn begin(&mut self, phase: LogPhase) -> Option<(TaskId, u64, CancellationToken)> {
        let task_id = self.task_id.clone()?;
        self.cancel_active();
        let session = self.bump_session();
        self.view.send_modify(|view| {
            view.session = session;
            view.phase = phase;
            view.error = None;
        });
        Some((task_id, session, CancellationToken::new()))
    }

    fn bump_session(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    fn cancel_active(&mut self) {
        if let Some(session) = self.active.take() {
            tracing::debug!(session = session.id, "Cancelling log session");
            session.cancel.cancel();
        }
    }
}

impl Drop for LogStreamConsumer {
    fn drop(&mut self) {
        if let Some(session) = self.active.take() {
            session.cancel.cancel();
            session.handle.abort();
        }
    }
}

/// Apply `f` to the view if `session` is still current.
///
/// Returns `false` when the session has been superseded.
fn write_view<F>(view: &watch::Sender<LogView>, session: u64, f: F) -> bool
where
    F: FnOnce(&mut LogView),
{
    view.send_if_modified(|current| {
        if current.session != session {
            return false;
        }
        f(current);
        true
    })
}

async fn run_snapshot(
    source: Arc<dyn LogSource>,
    task_id: TaskId,
    session: u64,
    view: Arc<watch::Sender<LogView>>,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = source.fetch_log(&task_id) => result,
    };

    match result {
        Ok(text) => {
            tracing::debug!(task_id = %task_id, bytes = text.len(), "Fetched log snapshot");
            write_view(&view, session, |v| {
                v.text = text;
                v.phase = LogPhase::Idle;
            });
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to fetch log");
            write_view(&view, session, |v| {
                v.phase = LogPhase::Idle;
                v.error = Some(e.to_string());
            });
        }
    }
}

async fn run_follow(
    source: Arc<dyn LogSource>,
    task_id: TaskId,
    session: u64,
    view: Arc<watch::Sender<LogView>>,
    event_tx: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = source.open_log_stream(&task_id) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to open log stream");
            write_view(&view, session, |v| {
                v.phase = LogPhase::Idle;
                v.error = Some(e.to_string());
            });
            return;
        }
    };

    if !write_view(&view, session, |v| v.text.clear()) {
        return;
    }
    tracing::info!(task_id = %task_id, "Log stream opened");
    events::emit(
        &event_tx,
        ClientEvent::LogStreamStarted {
            task_id: task_id.clone(),
        },
    );

    let mut decoder = Utf8StreamDecoder::new();
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let text = decoder.decode(&chunk);
                if text.is_empty() {
                    continue;
                }
                if !write_view(&view, session, |v| v.text.push_str(&text)) {
                    break StreamEnd::Cancelled;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(task_id = %task_id, error = %e, "Log stream failed");
                let tail = decoder.finish();
                write_view(&view, session, |v| {
                    v.text.push_str(&tail);
                    v.phase = LogPhase::Idle;
                    v.error = Some(e.to_string());
                });
                break StreamEnd::Failed;
            }
            None => {
                let tail = decoder.finish();
                write_view(&view, session, |v| {
                    v.text.push_str(&tail);
                    v.phase = LogPhase::Idle;
                });
                break StreamEnd::Completed;
            }
        }
    };

    tracing::info!(task_id = %task_id, reason = ?reason, "Log stream closed");
    events::emit(&event_tx, ClientEvent::LogStreamEnded { task_id, reason });
}
