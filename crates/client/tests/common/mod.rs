//! Scripted fakes shared by the client integration tests.
//!
//! Delays are expressed against the Tokio clock, so tests run with
//! `#[tokio::test(start_paused = true)]` and advance virtual time instead
//! of sleeping.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vacal_client::events::ClientEvent;
use vacal_client::registry::{LogByteStream, LogSource, TaskRegistry};
use vacal_client::TransportError;
use vacal_core::task::{Task, TaskListEntry, TaskStatus};
use vacal_core::types::TaskId;

/// One scripted reply: an optional delay, then a value or an HTTP status.
#[derive(Debug, Clone)]
pub struct Step<T> {
    pub delay: Duration,
    pub reply: Result<T, u16>,
}

impl<T> Step<T> {
    pub fn ok(value: T) -> Self {
        Self::after(0, value)
    }

    pub fn after(ms: u64, value: T) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            reply: Ok(value),
        }
    }

    pub fn fail(status: u16) -> Self {
        Self::fail_after(0, status)
    }

    pub fn fail_after(ms: u64, status: u16) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            reply: Err(status),
        }
    }

    async fn resolve(self) -> Result<T, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.map_err(|status| TransportError::Status {
            status,
            body: "scripted failure".into(),
        })
    }
}

/// Take the next step; the last one repeats forever.
fn next_step<T: Clone>(queue: &mut VecDeque<Step<T>>) -> Option<Step<T>> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    List,
    Clear,
}

/// [`TaskRegistry`] answering from per-endpoint scripts.
#[derive(Default)]
pub struct ScriptedRegistry {
    tasks: Mutex<HashMap<String, VecDeque<Step<Task>>>>,
    lists: Mutex<VecDeque<Step<Vec<TaskListEntry>>>>,
    clears: Mutex<VecDeque<Step<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_task(&self, id: &str, steps: Vec<Step<Task>>) {
        self.tasks
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.into());
    }

    pub fn script_list(&self, steps: Vec<Step<Vec<TaskListEntry>>>) {
        *self.lists.lock().unwrap() = steps.into();
    }

    pub fn script_clear(&self, steps: Vec<Step<()>>) {
        *self.clears.lock().unwrap() = steps.into();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_calls(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::Get(id.to_string()))
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::List)
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TaskRegistry for ScriptedRegistry {
    async fn list_tasks(&self) -> Result<Vec<TaskListEntry>, TransportError> {
        self.record(Call::List);
        let step = next_step(&mut self.lists.lock().unwrap());
        match step {
            Some(step) => step.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task, TransportError> {
        self.record(Call::Get(id.to_string()));
        let step = self
            .tasks
            .lock()
            .unwrap()
            .get_mut(id.as_str())
            .and_then(next_step);
        match step {
            Some(step) => step.resolve().await,
            None => Step::fail(404).resolve().await,
        }
    }

    async fn clear_tasks(&self) -> Result<(), TransportError> {
        self.record(Call::Clear);
        let step = next_step(&mut self.clears.lock().unwrap());
        match step {
            Some(step) => step.resolve().await,
            None => Ok(()),
        }
    }
}

type Chunk = Result<Vec<u8>, u16>;

/// Test-side handle feeding one follow stream.
///
/// Dropping the feed ends the stream normally.
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl StreamFeed {
    pub fn send(&self, bytes: &[u8]) {
        let _ = self.tx.send(Ok(bytes.to_vec()));
    }

    pub fn fail(&self, status: u16) {
        let _ = self.tx.send(Err(status));
    }

    /// `true` once the consumer dropped its end of the stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// [`LogSource`] with scripted snapshots and test-driven follow streams.
#[derive(Default)]
pub struct FakeLogSource {
    snapshots: Mutex<VecDeque<Step<String>>>,
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Chunk>>>,
    fetch_calls: Mutex<usize>,
    open_calls: Mutex<usize>,
}

impl FakeLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_snapshot(&self, steps: Vec<Step<String>>) {
        *self.snapshots.lock().unwrap() = steps.into();
    }

    /// Queue a follow stream; the next `open_log_stream` call gets it.
    pub fn push_stream(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        StreamFeed { tx }
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock().unwrap()
    }

    pub fn open_calls(&self) -> usize {
        *self.open_calls.lock().unwrap()
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn fetch_log(&self, _id: &TaskId) -> Result<String, TransportError> {
        *self.fetch_calls.lock().unwrap() += 1;
        let step = next_step(&mut self.snapshots.lock().unwrap());
        match step {
            Some(step) => step.resolve().await,
            None => Step::fail(404).resolve().await,
        }
    }

    async fn open_log_stream(&self, _id: &TaskId) -> Result<LogByteStream, TransportError> {
        *self.open_calls.lock().unwrap() += 1;
        let rx = self.streams.lock().unwrap().pop_front();
        let Some(rx) = rx else {
            return Step::fail(404).resolve().await;
        };
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            let chunk = rx.recv().await?;
            let item = chunk.map_err(|status| TransportError::Status {
                status,
                body: "stream broke".into(),
            });
            Some((item, rx))
        });
        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn task(id: &str, status: TaskStatus) -> Task {
    Task {
        task_id: TaskId::from(id),
        status,
        result: None,
        error: None,
    }
}

pub fn entry(id: &str, status: TaskStatus) -> TaskListEntry {
    TaskListEntry {
        task_id: TaskId::from(id),
        status,
    }
}

/// Advance the paused clock by `ms`, letting spawned tasks run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Every event currently buffered on `rx`.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
