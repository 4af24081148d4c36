//! Step outcomes and run reports.
//!
//! The [`RunReport`] is the only artifact a run produces for external
//! consumers. Every step of every scheduled suite appears in it exactly once
//! with a terminal status, even when an early step fails.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::Violation;

/// Terminal status of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Why a step did not pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport-level failure: timeout, refused connection, malformed request.
    Infrastructure,
    /// One or more contract violations.
    Assertion,
    /// A prerequisite step failed or was skipped.
    Dependency,
    /// The step's `if` condition evaluated to false.
    Condition,
    /// The run was cancelled before the step reached a terminal state.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Infrastructure => "infrastructure",
            FailureKind::Assertion => "assertion",
            FailureKind::Dependency => "dependency",
            FailureKind::Condition => "condition",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Outcome of executing (or skipping) one step.
///
/// Serialized in camelCase; the step id is written as `stepName`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub suite: String,
    #[serde(rename = "stepName")]
    pub step: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Slots written by this step's capture rules.
    #[serde(default)]
    pub captured: IndexMap<String, Value>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl StepReport {
    /// Creates a skipped report with a single log line and no invocation.
    pub fn skipped(suite: &str, step: &str, failure: FailureKind, log: String) -> Self {
        Self {
            suite: suite.to_string(),
            step: step.to_string(),
            status: StepStatus::Skipped,
            failure: Some(failure),
            http_status: None,
            elapsed_ms: 0,
            violations: Vec::new(),
            captured: IndexMap::new(),
            logs: vec![log],
            started_at: None,
        }
    }

    /// Qualified `suite.step` identifier.
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.suite, self.step)
    }

    pub fn is_infrastructure_failure(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Infrastructure))
    }
}

/// Aggregated counts over a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub infrastructure_failures: usize,
}

impl RunSummary {
    pub fn from_steps(steps: &[StepReport]) -> Self {
        let mut summary = RunSummary {
            total: steps.len(),
            ..Default::default()
        };
        for step in steps {
            match step.status {
                StepStatus::Passed => summary.passed += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
            if step.is_infrastructure_failure() {
                summary.infrastructure_failures += 1;
            }
        }
        summary
    }
}

/// Ordered collection of step reports for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub steps: Vec<StepReport>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(run_id: String, started_at: DateTime<Utc>, steps: Vec<StepReport>, cancelled: bool) -> Self {
        let summary = RunSummary::from_steps(&steps);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            steps,
            summary,
        }
    }

    /// True when no step failed. Skipped steps do not fail a run on their own.
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0 && !self.cancelled
    }

    /// Looks up a step by suite and step identifier.
    pub fn step(&self, suite: &str, step: &str) -> Option<&StepReport> {
        self.steps.iter().find(|report| report.suite == suite && report.step == step)
    }

    /// Merges several independent reports into one, preserving order.
    pub fn merge(run_id: String, reports: Vec<RunReport>) -> Self {
        let started_at = reports.iter().map(|report| report.started_at).min().unwrap_or_else(Utc::now);
        let cancelled = reports.iter().any(|report| report.cancelled);
        let steps = reports.into_iter().flat_map(|report| report.steps).collect();
        RunReport::new(run_id, started_at, steps, cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(step: &str, status: StepStatus, failure: Option<FailureKind>) -> StepReport {
        StepReport {
            suite: "auth".into(),
            step: step.into(),
            status,
            failure,
            http_status: None,
            elapsed_ms: 0,
            violations: vec![],
            captured: IndexMap::new(),
            logs: vec![],
            started_at: None,
        }
    }

    #[test]
    fn summary_counts_statuses_and_infrastructure_failures() {
        let steps = vec![
            report("login", StepStatus::Failed, Some(FailureKind::Infrastructure)),
            report("profile", StepStatus::Skipped, Some(FailureKind::Dependency)),
            report("health", StepStatus::Passed, None),
        ];
        let summary = RunSummary::from_steps(&steps);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.infrastructure_failures, 1);
    }

    #[test]
    fn step_report_serializes_with_external_field_names() {
        let mut step = report("login", StepStatus::Failed, Some(FailureKind::Assertion));
        step.elapsed_ms = 42;
        step.http_status = Some(500);
        let json = serde_json::to_value(RunReport::new("run-2".into(), Utc::now(), vec![step], false)).expect("serialize");

        assert_eq!(json["runId"], "run-2");
        assert_eq!(json["summary"]["infrastructureFailures"], 0);
        let first = &json["steps"][0];
        assert_eq!(first["stepName"], "login");
        assert_eq!(first["status"], "failed");
        assert_eq!(first["elapsedMs"], 42);
        assert_eq!(first["httpStatus"], 500);
        assert!(first["violations"].as_array().is_some_and(Vec::is_empty));
        assert!(first.get("step").is_none() && first.get("elapsed_ms").is_none());
    }

    #[test]
    fn run_with_only_skips_is_successful() {
        let steps = vec![report("optional", StepStatus::Skipped, Some(FailureKind::Condition))];
        let run = RunReport::new("run-1".into(), Utc::now(), steps, false);
        assert!(run.is_success());
        assert!(run.step("auth", "optional").is_some());
    }
}
