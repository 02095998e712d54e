//! Client-side events emitted by the pollers and the log consumer.
//!
//! Delivered over a [`tokio::sync::broadcast`] channel so the composing
//! application can observe synchronization activity from one feed.

use serde::Serialize;
use tokio::sync::broadcast;
use vacal_core::task::TaskStatus;
use vacal_core::types::TaskId;

/// Broadcast channel capacity for client events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub enum ClientEvent {
    /// The status poller applied a fresh snapshot.
    TaskUpdated { task_id: TaskId, status: TaskStatus },

    /// A poll request failed; the loop keeps running.
    PollFailed {
        task_id: Option<TaskId>,
        error: String,
    },

    /// The history poller replaced its list.
    HistoryRefreshed { count: usize },

    /// The local history was emptied.
    HistoryCleared,

    /// The server did not confirm a bulk clear. Local state stays cleared.
    ClearFailed { error: String },

    /// A follow-mode log stream was opened.
    LogStreamStarted { task_id: TaskId },

    /// A follow-mode log stream ended.
    LogStreamEnded { task_id: TaskId, reason: StreamEnd },
}

/// Why a log stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// The server closed the body.
    Completed,
    /// The owner aborted the stream.
    Cancelled,
    /// The transport failed mid-stream.
    Failed,
}

/// Create a sender for [`ClientEvent`]s.
pub fn channel() -> broadcast::Sender<ClientEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Send an event, ignoring the error that only means nobody listens.
pub(crate) fn emit(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    let _ = tx.send(event);
}
