//! Run tracking: lifecycle state, per-generation reports and the final outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ds_types::Candidate;

/// Unique optimizer run identifier.
pub type RunId = Uuid;

/// Lifecycle state for an optimizer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// What one generation did.
///
/// Losses that are not finite (nothing accepted yet, every candidate NaN)
/// are reported as `None` so that a report always survives a JSON round
/// trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    /// Whether the distribution was refit this generation.
    pub improved: bool,
    /// Best accepted loss after this generation.
    pub best_loss: Option<f64>,
    pub window_start: usize,
    pub window_width: usize,
    pub window_stddev: Option<f64>,
    pub representative_loss: Option<f64>,
    /// Lowest loss sampled this generation, accepted or not.
    pub population_min_loss: Option<f64>,
    pub elapsed_ms: u64,
}

/// `Some(value)` for finite values.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Aggregate status of an optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub task: String,
    pub state: RunState,
    pub generations_completed: usize,
    pub improvements: usize,
    pub best_loss: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            state: RunState::Pending,
            generations_completed: 0,
            improvements: 0,
            best_loss: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn record(&mut self, report: &GenerationReport) {
        self.generations_completed = report.generation + 1;
        if report.improved {
            self.improvements += 1;
            self.best_loss = report.best_loss;
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    BudgetExhausted,
    TargetReached,
    Cancelled,
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Lowest-loss candidate ever accepted.
    pub best: Candidate,
    pub best_loss: f64,
    /// Generation in which `best` was accepted.
    pub best_generation: usize,
    /// Generations actually executed.
    pub generations: usize,
    pub stop_reason: StopReason,
    pub status: RunStatus,
}
