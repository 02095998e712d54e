//! Seams between the pollers / log consumer and the transport.
//!
//! [`TaskApi`](crate::api::TaskApi) implements both traits over HTTP;
//! tests substitute scripted fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use vacal_core::task::{Task, TaskListEntry};
use vacal_core::types::TaskId;

use crate::error::TransportError;

/// Raw log bytes as they arrive from a follow request.
pub type LogByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Authoritative source of task state.
#[async_trait]
pub trait TaskRegistry: Send + Sync + 'static {
    /// All known tasks, most recent first.
    async fn list_tasks(&self) -> Result<Vec<TaskListEntry>, TransportError>;

    async fn get_task(&self, id: &TaskId) -> Result<Task, TransportError>;

    /// Delete every task on the server.
    async fn clear_tasks(&self) -> Result<(), TransportError>;
}

/// Per-task log resource.
#[async_trait]
pub trait LogSource: Send + Sync + 'static {
    /// The complete log as of now.
    async fn fetch_log(&self, id: &TaskId) -> Result<String, TransportError>;

    /// Open a follow stream; the server keeps appending until it closes.
    async fn open_log_stream(&self, id: &TaskId) -> Result<LogByteStream, TransportError>;
}
