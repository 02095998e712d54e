//! Integration tests for the status poller against a scripted registry.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{advance, drain, task, ScriptedRegistry, Step};
use vacal_client::events::ClientEvent;
use vacal_client::status::{StatusPoller, StatusPollerConfig, TerminalPolicy};
use vacal_core::task::TaskStatus;
use vacal_core::types::TaskId;

fn poller(registry: &Arc<ScriptedRegistry>, policy: TerminalPolicy) -> StatusPoller {
    StatusPoller::new(
        registry.clone(),
        StatusPollerConfig {
            interval: Duration::from_secs(2),
            terminal_policy: policy,
        },
    )
}

fn status_of(poller: &StatusPoller) -> Option<TaskStatus> {
    poller.current().map(|t| t.status)
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fetches_immediately_then_every_period() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("abc123", vec![Step::ok(task("abc123", TaskStatus::Pending))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;
    assert_eq!(registry.get_calls("abc123"), 1);
    assert_eq!(status_of(&poller), Some(TaskStatus::Pending));

    advance(2000).await;
    assert_eq!(registry.get_calls("abc123"), 2);
    advance(2000).await;
    assert_eq!(registry.get_calls("abc123"), 3);
}

#[tokio::test(start_paused = true)]
async fn idle_without_a_task() {
    let registry = Arc::new(ScriptedRegistry::new());
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(None);
    advance(10_000).await;
    assert!(registry.calls().is_empty());
    assert!(poller.current().is_none());
    assert!(!poller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn rewatching_same_id_does_not_restart() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("abc123", vec![Step::ok(task("abc123", TaskStatus::Running))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;
    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;

    assert_eq!(registry.get_calls("abc123"), 1);
    assert_eq!(status_of(&poller), Some(TaskStatus::Running));
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_older_response_does_not_overwrite_newer() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task(
        "abc123",
        vec![
            // First request resolves after the second one.
            Step::after(3000, task("abc123", TaskStatus::Running)),
            Step::ok(task("abc123", TaskStatus::Pending)),
        ],
    );
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(2500).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Pending));

    advance(1000).await;
    assert_eq!(registry.get_calls("abc123"), 2);
    assert_eq!(status_of(&poller), Some(TaskStatus::Pending));
}

#[tokio::test(start_paused = true)]
async fn switching_task_publishes_nothing_from_old_id() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("old", vec![Step::after(1500, task("old", TaskStatus::Running))]);
    registry.script_task("new", vec![Step::ok(task("new", TaskStatus::Pending))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);
    let mut events = poller.events();

    poller.watch(Some(TaskId::from("old")));
    advance(500).await;
    poller.watch(Some(TaskId::from("new")));
    advance(3000).await;

    assert_eq!(registry.get_calls("old"), 1);
    let current = poller.current().expect("new task published");
    assert_eq!(current.task_id.as_str(), "new");

    let updated: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ClientEvent::TaskUpdated { task_id, .. } => Some(task_id.to_string()),
            _ => None,
        })
        .collect();
    assert!(!updated.is_empty());
    assert!(updated.iter().all(|id| id == "new"), "got {updated:?}");
}

#[tokio::test(start_paused = true)]
async fn switch_clears_snapshot_until_new_response() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("a", vec![Step::ok(task("a", TaskStatus::Success))]);
    registry.script_task("b", vec![Step::after(1000, task("b", TaskStatus::Running))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("a")));
    advance(1).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Success));

    poller.watch(Some(TaskId::from("b")));
    assert!(poller.current().is_none());
    advance(1001).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Running));
}

// ---------------------------------------------------------------------------
// Terminal handling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn keeps_polling_after_terminal_by_default() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("abc123", vec![Step::ok(task("abc123", TaskStatus::Success))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(4001).await;
    assert_eq!(registry.get_calls("abc123"), 3);
    assert!(poller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn stop_on_terminal_stops_issuing_requests() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task(
        "abc123",
        vec![
            Step::ok(task("abc123", TaskStatus::Running)),
            Step::ok(task("abc123", TaskStatus::Success)),
        ],
    );
    let mut poller = poller(&registry, TerminalPolicy::StopOnTerminal);

    poller.watch(Some(TaskId::from("abc123")));
    advance(2001).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Success));

    advance(10_000).await;
    assert_eq!(registry.get_calls("abc123"), 2);
    assert!(!poller.is_polling());
    assert_eq!(poller.watched().map(TaskId::as_str), Some("abc123"));
}

#[tokio::test(start_paused = true)]
async fn terminal_snapshot_is_not_regressed() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task(
        "abc123",
        vec![
            Step::ok(task("abc123", TaskStatus::Success)),
            Step::ok(task("abc123", TaskStatus::Running)),
        ],
    );
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(4001).await;
    assert_eq!(registry.get_calls("abc123"), 3);
    assert_eq!(status_of(&poller), Some(TaskStatus::Success));
}

// ---------------------------------------------------------------------------
// Failures and teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fetch_errors_do_not_stop_the_loop() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task(
        "abc123",
        vec![Step::fail(500), Step::ok(task("abc123", TaskStatus::Running))],
    );
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);
    let mut events = poller.events();

    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;
    assert!(poller.current().is_none());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, ClientEvent::PollFailed { task_id: Some(id), .. } if id.as_str() == "abc123")));

    advance(2000).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Running));
}

#[tokio::test(start_paused = true)]
async fn error_keeps_last_known_state() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task(
        "abc123",
        vec![Step::ok(task("abc123", TaskStatus::Running)), Step::fail(502)],
    );
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(4001).await;
    assert_eq!(status_of(&poller), Some(TaskStatus::Running));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling_and_clears_snapshot() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("abc123", vec![Step::ok(task("abc123", TaskStatus::Running))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;
    poller.shutdown();
    advance(10_000).await;

    assert_eq!(registry.get_calls("abc123"), 1);
    assert!(poller.current().is_none());
    assert!(poller.watched().is_none());
}

#[tokio::test(start_paused = true)]
async fn drop_cancels_the_loop() {
    let registry = Arc::new(ScriptedRegistry::new());
    registry.script_task("abc123", vec![Step::ok(task("abc123", TaskStatus::Running))]);
    let mut poller = poller(&registry, TerminalPolicy::KeepPolling);

    poller.watch(Some(TaskId::from("abc123")));
    advance(1).await;
    drop(poller);
    advance(10_000).await;

    assert_eq!(registry.get_calls("abc123"), 1);
}
