//! Result renderer: turns a [`Task`] into a stable, display-ready view.
//!
//! Rendering is total. Absent metadata is omitted, absent rankings yield
//! no tables, and a cause with a missing share shows [`MISSING_CELL`]
//! instead of failing. Cause order is always the order received.

use std::fmt;

use serde::Serialize;

use crate::result::{AlgorithmResult, Cause, ResultData, Summary};
use crate::task::{Task, TaskStatus};
use crate::types::TaskId;

/// Algorithm key denoting the blended ensemble result.
pub const COMBINED_ALGORITHM: &str = "ensemble";

/// Cell text for a share the server did not report.
pub const MISSING_CELL: &str = "n/a";

/// Colour intent of a status or notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Muted,
    Progress,
    Success,
    Danger,
}

/// Direction of a calibrated-vs-uncalibrated change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    Increase,
    Decrease,
    Neutral,
}

impl ChangeClass {
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaCell {
    pub text: String,
    pub class: ChangeClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CauseRow {
    /// 1-based position in the received list.
    pub rank: usize,
    pub cause: String,
    /// Only populated for single-algorithm results.
    pub uncalibrated: Option<String>,
    pub calibrated: String,
    /// Only populated when both shares are known.
    pub change: Option<DeltaCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CauseTable {
    /// `None` for a single-algorithm result.
    pub algorithm: Option<String>,
    /// `true` for the blended ensemble table.
    pub combined: bool,
    /// `true` when rows carry uncalibrated and change columns.
    pub compare: bool,
    pub rows: Vec<CauseRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub total_causes: Option<u64>,
    pub total_algorithms: Option<u64>,
    pub calibration_applied: Option<bool>,
}

/// A failure shown to the user.
///
/// A task that failed on the server and a service the client could not
/// reach are different situations and are never merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    /// The task itself reported an error.
    TaskFailed(String),
    /// The client could not talk to the task service.
    Unreachable(String),
}

impl Notice {
    pub fn unreachable(err: impl fmt::Display) -> Self {
        Self::Unreachable(err.to_string())
    }

    pub fn tone(&self) -> Tone {
        Tone::Danger
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskFailed(msg) => write!(f, "Task failed: {msg}"),
            Self::Unreachable(msg) => write!(f, "Failed to reach service: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub tone: Tone,
    pub notice: Option<Notice>,
    /// `(label, value)` pairs for metadata fields that are present.
    pub metadata: Vec<(&'static str, String)>,
    pub tables: Vec<CauseTable>,
    pub summary: Option<SummaryView>,
    /// Raw script output, shown only when no structured data exists.
    pub raw_output: Option<String>,
}

/// Tone used for a status badge.
pub fn status_tone(status: &TaskStatus) -> Tone {
    match status {
        TaskStatus::Running => Tone::Progress,
        TaskStatus::Success => Tone::Success,
        TaskStatus::Failed => Tone::Danger,
        TaskStatus::Pending | TaskStatus::Other(_) => Tone::Muted,
    }
}

/// Format a fraction as a percentage with two decimals (`0.15432` -> `15.43%`).
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Signed percentage-point change from `uncalibrated` to `calibrated`.
///
/// The sign and class follow the delta at display precision, so `+0.00%`
/// is never produced; a zero delta renders `0.00%` as neutral.
pub fn format_delta(calibrated: f64, uncalibrated: f64) -> DeltaCell {
    let hundredths = ((calibrated - uncalibrated) * 10_000.0).round();
    let value = hundredths / 100.0;
    if hundredths > 0.0 {
        DeltaCell {
            text: format!("+{value:.2}%"),
            class: ChangeClass::Increase,
        }
    } else if hundredths < 0.0 {
        DeltaCell {
            text: format!("{value:.2}%"),
            class: ChangeClass::Decrease,
        }
    } else {
        DeltaCell {
            text: "0.00%".into(),
            class: ChangeClass::Neutral,
        }
    }
}

/// Build the view for a task in any state.
pub fn render_task(task: &Task) -> TaskView {
    let notice = match (&task.status, &task.error) {
        (_, Some(err)) => Some(Notice::TaskFailed(err.clone())),
        (TaskStatus::Failed, None) => Some(Notice::TaskFailed("no error details reported".into())),
        _ => None,
    };

    let mut view = TaskView {
        task_id: task.task_id.clone(),
        status: task.status.clone(),
        tone: status_tone(&task.status),
        notice,
        metadata: Vec::new(),
        tables: Vec::new(),
        summary: None,
        raw_output: None,
    };

    let Some(result) = &task.result else {
        return view;
    };

    match &result.result_data {
        Some(data) => render_data(data, &mut view),
        None => view.raw_output = result.output.clone().filter(|s| !s.trim().is_empty()),
    }
    view
}

fn render_data(data: &ResultData, view: &mut TaskView) {
    let meta = &data.metadata;
    let fields: [(&'static str, Option<String>); 6] = [
        ("Mode", meta.mode.clone()),
        ("Country", meta.country.clone()),
        ("Age group", meta.age_group.clone()),
        ("Data type", meta.data_type.clone()),
        ("Simulations", meta.nsim.map(|n| n.to_string())),
        ("Deaths", meta.n_deaths.map(|n| n.to_string())),
    ];
    view.metadata = fields
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label, v)))
        .collect();

    if !data.top_causes.is_empty() {
        view.tables.push(CauseTable {
            algorithm: None,
            combined: false,
            compare: true,
            rows: compare_rows(&data.top_causes),
        });
    }
    view.tables
        .extend(data.algorithms.iter().map(algorithm_table));

    view.summary = data.summary.as_ref().map(summary_view);
}

fn compare_rows(causes: &[Cause]) -> Vec<CauseRow> {
    causes
        .iter()
        .enumerate()
        .map(|(idx, cause)| CauseRow {
            rank: idx + 1,
            cause: cause_label(cause),
            uncalibrated: Some(percent_cell(cause.uncalibrated_csmf)),
            calibrated: percent_cell(cause.calibrated_csmf),
            change: cause
                .calibrated_csmf
                .zip(cause.uncalibrated_csmf)
                .map(|(cal, uncal)| format_delta(cal, uncal)),
        })
        .collect()
}

fn algorithm_table(algo: &AlgorithmResult) -> CauseTable {
    let rows = algo
        .causes
        .iter()
        .enumerate()
        .map(|(idx, cause)| CauseRow {
            rank: idx + 1,
            cause: cause_label(cause),
            uncalibrated: None,
            calibrated: percent_cell(cause.calibrated_csmf),
            change: None,
        })
        .collect();
    CauseTable {
        algorithm: Some(algo.name.clone()),
        combined: algo.name == COMBINED_ALGORITHM,
        compare: false,
        rows,
    }
}

fn summary_view(summary: &Summary) -> SummaryView {
    SummaryView {
        total_causes: summary.total_causes,
        total_algorithms: summary.total_algorithms,
        calibration_applied: summary.calibration_applied,
    }
}

fn cause_label(cause: &Cause) -> String {
    cause.cause.clone().unwrap_or_else(|| MISSING_CELL.into())
}

fn percent_cell(share: Option<f64>) -> String {
    share.map(format_percent).unwrap_or_else(|| MISSING_CELL.into())
}

// ---------------------------------------------------------------------------
// Plain-text rendering
// ---------------------------------------------------------------------------

impl fmt::Display for TaskView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Task {}  [{}]", self.task_id, self.status.label())?;
        if let Some(notice) = &self.notice {
            writeln!(f, "!! {notice}")?;
        }
        for (label, value) in &self.metadata {
            writeln!(f, "  {label:<12} {value}")?;
        }
        for table in &self.tables {
            writeln!(f)?;
            write!(f, "{table}")?;
        }
        if let Some(summary) = &self.summary {
            writeln!(f)?;
            if let Some(n) = summary.total_causes {
                writeln!(f, "  Total causes:      {n}")?;
            }
            if let Some(n) = summary.total_algorithms {
                writeln!(f, "  Algorithms:        {n}")?;
            }
            if let Some(applied) = summary.calibration_applied {
                writeln!(f, "  Calibration:       {}", if applied { "applied" } else { "not applied" })?;
            }
        }
        if let Some(raw) = &self.raw_output {
            writeln!(f)?;
            writeln!(f, "{raw}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CauseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.algorithm, self.combined) {
            (Some(_), true) => writeln!(f, "== Ensemble (combined) ==")?,
            (Some(name), false) => writeln!(f, "-- {name} --")?,
            (None, _) => writeln!(f, "-- Top causes --")?,
        }
        let width = self
            .rows
            .iter()
            .map(|r| r.cause.chars().count())
            .max()
            .unwrap_or(0)
            .max("Cause".len());

        if self.compare {
            writeln!(
                f,
                "{:>4}  {:<width$}  {:>12}  {:>10}  {:>8}",
                "Rank", "Cause", "Uncalibrated", "Calibrated", "Change"
            )?;
            for row in &self.rows {
                let change = row.change.as_ref().map_or(MISSING_CELL, |c| c.text.as_str());
                writeln!(
                    f,
                    "{:>4}  {:<width$}  {:>12}  {:>10}  {:>8}",
                    row.rank,
                    row.cause,
                    row.uncalibrated.as_deref().unwrap_or(MISSING_CELL),
                    row.calibrated,
                    change
                )?;
            }
        } else {
            writeln!(f, "{:>4}  {:<width$}  {:>10}", "Rank", "Cause", "Calibrated")?;
            for row in &self.rows {
                writeln!(f, "{:>4}  {:<width$}  {:>10}", row.rank, row.cause, row.calibrated)?;
            }
        }
        Ok(())
    }
}
