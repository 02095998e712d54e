//! REST API client for the calibration task service.
//!
//! Wraps the task endpoints (submission, listing, status, bulk delete,
//! logs) using [`reqwest`]. No request timeout is configured: a hung
//! request is bounded only by its owner cancelling it.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;
use vacal_core::request::CalibrationRequest;
use vacal_core::task::{Task, TaskList, TaskListEntry};
use vacal_core::types::TaskId;

use crate::error::{ClientError, TransportError};
use crate::registry::{LogByteStream, LogSource, TaskRegistry};

/// HTTP client for one task service instance.
#[derive(Debug, Clone)]
pub struct TaskApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /tasks/calibration`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued task.
    pub task_id: TaskId,
    #[serde(default)]
    pub status: Option<String>,
}

impl TaskApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a calibration job.
    ///
    /// The request is validated locally first; an invalid request never
    /// reaches the network.
    pub async fn submit_calibration(
        &self,
        request: &CalibrationRequest,
    ) -> Result<TaskId, ClientError> {
        request.check()?;

        let response = self
            .client
            .post(format!("{}/tasks/calibration", self.api_url))
            .json(request)
            .send()
            .await
            .map_err(TransportError::from)?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::info!(task_id = %submitted.task_id, mode = %request.mode, "Calibration task submitted");
        Ok(submitted.task_id)
    }

    /// List all tasks (`GET /tasks`), most recent first.
    pub async fn list_tasks(&self) -> Result<Vec<TaskListEntry>, TransportError> {
        let response = self
            .client
            .get(format!("{}/tasks", self.api_url))
            .send()
            .await?;
        let list: TaskList = Self::parse_response(response).await?;
        Ok(list.tasks)
    }

    /// Fetch one task's status and result (`GET /tasks/{id}`).
    pub async fn get_task(&self, id: &TaskId) -> Result<Task, TransportError> {
        let response = self
            .client
            .get(self.task_url(id, &[])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Delete every task on the server (`DELETE /tasks`).
    pub async fn clear_tasks(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .delete(format!("{}/tasks", self.api_url))
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Fetch the complete log text (`GET /tasks/{id}/logs`).
    pub async fn fetch_log(&self, id: &TaskId) -> Result<String, TransportError> {
        let response = self
            .client
            .get(self.task_url(id, &["logs"])?)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    /// Open a streaming log read (`GET /tasks/{id}/logs?follow=true`).
    ///
    /// The returned stream yields body chunks as the server writes them.
    /// Dropping it closes the connection.
    pub async fn open_log_stream(&self, id: &TaskId) -> Result<LogByteStream, TransportError> {
        let response = self
            .client
            .get(self.task_url(id, &["logs"])?)
            .query(&[("follow", "true")])
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let stream = response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(TransportError::from);
        Ok(Box::pin(stream))
    }

    /// Liveness probe (`GET /health`).
    pub async fn health(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// `{api_url}/tasks/{id}/{tail...}` with the id as one escaped segment.
    fn task_url(&self, id: &TaskId, tail: &[&str]) -> Result<reqwest::Url, TransportError> {
        let invalid = || TransportError::InvalidUrl(self.api_url.clone());
        let mut url = reqwest::Url::parse(&self.api_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("tasks")
            .push(id.as_str())
            .extend(tail);
        Ok(url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// The body is read as text first so that a malformed payload is
    /// reported as [`TransportError::Decode`], not as a request failure.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), TransportError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRegistry for TaskApi {
    async fn list_tasks(&self) -> Result<Vec<TaskListEntry>, TransportError> {
        TaskApi::list_tasks(self).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task, TransportError> {
        TaskApi::get_task(self, id).await
    }

    async fn clear_tasks(&self) -> Result<(), TransportError> {
        TaskApi::clear_tasks(self).await
    }
}

#[async_trait]
impl LogSource for TaskApi {
    async fn fetch_log(&self, id: &TaskId) -> Result<String, TransportError> {
        TaskApi::fetch_log(self, id).await
    }

    async fn open_log_stream(&self, id: &TaskId) -> Result<LogByteStream, TransportError> {
        TaskApi::open_log_stream(self, id).await
    }
}
