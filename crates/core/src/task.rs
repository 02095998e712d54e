//! Task status constants and the task records returned by the service.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::CalibrationResult;
use crate::types::{TaskId, Timestamp};

/// Task accepted but not yet picked up by a worker.
pub const STATUS_PENDING: &str = "pending";
/// Worker is executing the calibration.
pub const STATUS_RUNNING: &str = "running";
/// Calibration finished and produced a result.
pub const STATUS_SUCCESS: &str = "success";
/// Calibration failed; the task carries an `error`.
pub const STATUS_FAILED: &str = "failed";

/// Lifecycle state of a task.
///
/// `pending -> running -> success | failed`. The last two are terminal.
/// Unrecognised server states (e.g. `retry`, `revoked`) are kept verbatim
/// in [`TaskStatus::Other`] and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Running => STATUS_RUNNING,
            Self::Success => STATUS_SUCCESS,
            Self::Failed => STATUS_FAILED,
            Self::Other(s) => s,
        }
    }

    /// `true` for `success` and `failed`; no transitions follow these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Human-readable badge label.
    pub fn label(&self) -> String {
        match self {
            Self::Pending => "Pending".into(),
            Self::Running => "Running".into(),
            Self::Success => "Success".into(),
            Self::Failed => "Failed".into(),
            Self::Other(s) => s.clone(),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            STATUS_PENDING => Self::Pending,
            // Celery reports a picked-up task as STARTED.
            STATUS_RUNNING | "started" => Self::Running,
            STATUS_SUCCESS => Self::Success,
            STATUS_FAILED | "failure" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full task state as returned by `GET /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Present once the task is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CalibrationResult>,
    /// Server-reported failure reason, present only when `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// A task known only by id, before the server has reported on it.
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One entry of `GET /tasks`, as returned by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskListEntry {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// Envelope of `GET /tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<TaskListEntry>,
}

/// A task history row held by the client.
///
/// `first_seen` is stamped locally the first time the id appears in a
/// list response and kept across refreshes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub first_seen: Timestamp,
}
