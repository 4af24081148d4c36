//! Lifecycle events streamed while a run is in progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::StepReport;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Events emitted by the scheduler over an optional channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        at: DateTime<Utc>,
        step_count: usize,
    },
    StepStarted {
        index: usize,
        suite: String,
        step: String,
        label: String,
        started_at: DateTime<Utc>,
    },
    StepFinished {
        index: usize,
        report: Box<StepReport>,
    },
    RunCompleted {
        status: RunStatus,
        finished_at: DateTime<Utc>,
    },
}
