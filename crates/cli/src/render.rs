//! Plain-text rendering of run progress, plans and summaries.

use verity_engine::ExecutionPlan;
use verity_types::{RunReport, StepReport, StepStatus, SuiteBundle};

pub fn step_line(report: &StepReport) -> String {
    let marker = match report.status {
        StepStatus::Passed => "PASS",
        StepStatus::Failed => "FAIL",
        StepStatus::Skipped => "SKIP",
    };
    let mut line = format!("{marker}  {}", report.qualified_id());
    if let Some(status) = report.http_status {
        line.push_str(&format!("  {status}"));
    }
    if report.status != StepStatus::Skipped {
        line.push_str(&format!("  {} ms", report.elapsed_ms));
    }
    if let Some(failure) = report.failure {
        line.push_str(&format!("  ({})", failure.as_str()));
    }
    line
}

/// Step line followed by one indented line per violation. Skipped steps and
/// infrastructure failures also show their last log line.
pub fn step_block(report: &StepReport) -> Vec<String> {
    let mut lines = vec![step_line(report)];
    lines.extend(report.violations.iter().map(|violation| format!("      - {violation}")));
    if (report.status == StepStatus::Skipped || report.is_infrastructure_failure())
        && let Some(reason) = report.logs.last()
    {
        lines.push(format!("      {reason}"));
    }
    lines
}

pub fn summary_line(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut line = format!(
        "{} steps: {} passed, {} failed, {} skipped",
        summary.total, summary.passed, summary.failed, summary.skipped
    );
    if summary.infrastructure_failures > 0 {
        line.push_str(&format!(" ({} infrastructure)", summary.infrastructure_failures));
    }
    if report.cancelled {
        line.push_str(" [cancelled]");
    }
    line
}

pub fn plan_lines(plan: &ExecutionPlan<'_>) -> Vec<String> {
    plan.steps
        .iter()
        .enumerate()
        .map(|(index, planned)| {
            let mut line = format!("{:>3}. {} [priority {}]", index + 1, planned.qualified_id(), planned.step.priority);
            if !planned.dependencies.is_empty() {
                line.push_str(&format!(" after {}", planned.dependencies.join(", ")));
            }
            if let Some(condition) = &planned.step.r#if {
                line.push_str(&format!(" if {condition}"));
            }
            line
        })
        .collect()
}

pub fn list_lines(bundle: &SuiteBundle) -> Vec<String> {
    let mut lines = Vec::new();
    for suite in &bundle.suites {
        let title = suite.title.as_deref().map(|title| format!(" - {title}")).unwrap_or_default();
        lines.push(format!("{} (endpoint: {}){title}", suite.suite, suite.endpoint));
        for step in &suite.steps {
            lines.push(format!("  {:<24} {:<7} {}", step.id, step.request.method.as_str(), step.request.path));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use verity_types::{FailureKind, Violation};

    use super::*;

    fn failed_step() -> StepReport {
        StepReport {
            suite: "catalog".into(),
            step: "create".into(),
            status: StepStatus::Failed,
            failure: Some(FailureKind::Assertion),
            http_status: Some(500),
            elapsed_ms: 42,
            violations: vec![Violation::MissingField { path: "data._id".into() }],
            captured: Default::default(),
            logs: vec!["POST /catalog".into()],
            started_at: None,
        }
    }

    #[test]
    fn step_block_lists_violations() {
        let lines = step_block(&failed_step());
        assert_eq!(lines[0], "FAIL  catalog.create  500  42 ms  (assertion)");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("data._id"));
    }

    #[test]
    fn skipped_step_shows_reason() {
        let skipped = StepReport::skipped(
            "catalog",
            "delete",
            FailureKind::Dependency,
            "step 'delete' skipped because dependency 'catalog.create' failed earlier in the run".into(),
        );
        let lines = step_block(&skipped);
        assert_eq!(lines[0], "SKIP  catalog.delete  (dependency)");
        assert!(lines[1].contains("catalog.create"));
    }

    #[test]
    fn summary_mentions_infrastructure_and_cancellation() {
        let mut step = failed_step();
        step.failure = Some(FailureKind::Infrastructure);
        let report = RunReport::new("run-1".into(), Utc::now(), vec![step], true);
        assert_eq!(summary_line(&report), "1 steps: 0 passed, 1 failed, 0 skipped (1 infrastructure) [cancelled]");
    }
}
