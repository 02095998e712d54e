//! Subcommand implementations.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use vacal_client::events::{self, ClientEvent};
use vacal_client::history::{HistoryPoller, HistoryPollerConfig, TaskHistory};
use vacal_client::logs::LogView;
use vacal_client::status::{StatusPollerConfig, TerminalPolicy};
use vacal_client::{ClientConfig, ClientError, LogStreamConsumer, StatusPoller, TaskApi, TransportError};
use vacal_core::render::{render_task, Notice};
use vacal_core::request::CalibrationRequest;
use vacal_core::task::TaskSummary;
use vacal_core::types::TaskId;

pub struct Context {
    config: ClientConfig,
    api: Arc<TaskApi>,
}

impl Context {
    pub fn new(config: ClientConfig) -> Self {
        let api = Arc::new(TaskApi::new(config.api_url.clone()));
        Self { config, api }
    }

    pub async fn submit(&self, request: CalibrationRequest, watch: bool) -> anyhow::Result<()> {
        let task_id = self
            .api
            .submit_calibration(&request)
            .await
            .map_err(client_error)?;
        println!("Submitted task {task_id}");

        if watch {
            self.watch(task_id, false).await?;
        }
        Ok(())
    }

    pub async fn tasks(&self, watch: bool) -> anyhow::Result<()> {
        if !watch {
            let list = self.api.list_tasks().await.map_err(unreachable)?;
            let mut history = TaskHistory::new();
            history.refresh(list, Utc::now());
            print_history(history.entries());
            return Ok(());
        }

        let events = events::channel();
        let mut event_rx = events.subscribe();
        let poller = HistoryPoller::start_with_events(
            self.api.clone(),
            HistoryPollerConfig {
                interval: self.config.history_interval,
            },
            events.clone(),
        );
        let mut list_rx = poller.subscribe();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                changed = list_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let entries = list_rx.borrow_and_update().clone();
                    print_history(&entries);
                    println!();
                }
                event = event_rx.recv() => {
                    if let Ok(ClientEvent::PollFailed { error, .. }) = event {
                        eprintln!("{}", Notice::Unreachable(error));
                    }
                }
            }
        }

        poller.shutdown();
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.api.clear_tasks().await.map_err(unreachable)?;
        println!("All tasks cleared");
        Ok(())
    }

    pub async fn show(&self, task_id: TaskId, json: bool) -> anyhow::Result<()> {
        let task = self.api.get_task(&task_id).await.map_err(unreachable)?;
        let view = render_task(&task);
        if json {
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            print!("{view}");
        }
        Ok(())
    }

    /// Poll `task_id` until it is terminal, then print its results.
    pub async fn watch(&self, task_id: TaskId, follow_logs: bool) -> anyhow::Result<()> {
        let events = events::channel();
        let mut event_rx = events.subscribe();

        let mut poller = StatusPoller::with_events(
            self.api.clone(),
            StatusPollerConfig {
                interval: self.config.status_interval,
                terminal_policy: TerminalPolicy::StopOnTerminal,
            },
            events.clone(),
        );
        let mut status_rx = poller.subscribe();
        poller.watch(Some(task_id.clone()));

        let mut logs = LogStreamConsumer::with_events(self.api.clone(), events.clone());
        let mut log_rx = logs.subscribe();
        let mut printer = LogPrinter::default();
        if follow_logs {
            logs.set_task(Some(task_id.clone()));
            logs.follow();
        }

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut last_status = None;

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!(task_id = %task_id, "Interrupted");
                    break;
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(task) = status_rx.borrow_and_update().clone() else {
                        continue;
                    };
                    if last_status.as_ref() != Some(&task.status) {
                        eprintln!("[{}] {}", task.task_id.short(), task.status.label());
                        last_status = Some(task.status.clone());
                    }
                    if task.is_terminal() {
                        println!();
                        print!("{}", render_task(&task));
                        break;
                    }
                }
                changed = log_rx.changed(), if follow_logs => {
                    if changed.is_ok() {
                        printer.print(&log_rx.borrow_and_update());
                    }
                }
                event = event_rx.recv() => {
                    if let Ok(ClientEvent::PollFailed { error, .. }) = event {
                        eprintln!("{}", Notice::Unreachable(error));
                    }
                }
            }
        }

        logs.stop();
        poller.shutdown();
        Ok(())
    }

    pub async fn logs(&self, task_id: TaskId, follow: bool) -> anyhow::Result<()> {
        if !follow {
            let text = self.api.fetch_log(&task_id).await.map_err(unreachable)?;
            print!("{text}");
            return Ok(());
        }

        let mut consumer = LogStreamConsumer::new(self.api.clone());
        let mut rx = consumer.subscribe();
        let mut printer = LogPrinter::default();
        consumer.set_task(Some(task_id));
        consumer.follow();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    consumer.stop();
                    break;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = rx.borrow_and_update().clone();
                    printer.print(&view);
                    if !view.is_busy() {
                        if let Some(error) = view.error {
                            anyhow::bail!("{}", Notice::Unreachable(error));
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn health(&self) -> anyhow::Result<()> {
        self.api.health().await.map_err(unreachable)?;
        println!("Task service at {} is healthy", self.api.api_url());
        Ok(())
    }
}

/// Writes only the part of the log not printed yet.
#[derive(Default)]
struct LogPrinter {
    printed: usize,
}

impl LogPrinter {
    fn print(&mut self, view: &LogView) {
        if view.text.len() < self.printed {
            // The view was reset; start over.
            self.printed = 0;
        }
        if let Some(fresh) = view.text.get(self.printed..) {
            if !fresh.is_empty() {
                print!("{fresh}");
                let _ = std::io::stdout().flush();
            }
            self.printed = view.text.len();
        }
    }
}

fn print_history(entries: &[TaskSummary]) {
    if entries.is_empty() {
        println!("No tasks");
        return;
    }
    println!("{:<38}  {:<10}  First seen", "Task", "Status");
    for entry in entries {
        println!(
            "{:<38}  {:<10}  {}",
            entry.task_id,
            entry.status.label(),
            entry.first_seen.format("%Y-%m-%d %H:%M:%S"),
        );
    }
}

/// A failure to talk to the service, worded apart from a task's own error.
fn unreachable(err: TransportError) -> anyhow::Error {
    anyhow::Error::msg(Notice::unreachable(err).to_string())
}

fn client_error(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Transport(e) => unreachable(e),
        other => other.into(),
    }
}
