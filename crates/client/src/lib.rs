//! Task-lifecycle synchronization and log streaming for the VA
//! calibration service.
//!
//! Provides the HTTP client for the task service, the status and history
//! pollers that reconcile local state with the server, and the log
//! stream consumer with cooperative cancellation.

pub mod api;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod gate;
pub mod history;
pub mod logs;
pub mod registry;
pub mod status;

pub use api::TaskApi;
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use history::HistoryPoller;
pub use logs::LogStreamConsumer;
pub use status::StatusPoller;
