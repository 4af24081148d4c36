//! Sequential suite scheduler with dependency skip propagation, run-scoped
//! cancellation, and lifecycle events.
//!
//! Steps move `Pending → Running → {Passed, Failed, Skipped}`. A step whose
//! dependency did not pass is skipped without invoking the executor. Once the
//! run's [`CancellationToken`] fires, every step that has not reached a
//! terminal state is reported as skipped. The run always ends with a full
//! [`RunReport`].

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use verity_types::{FailureKind, RunEvent, RunReport, RunStatus, StepReport, StepStatus, SuiteDefinition};

use crate::{
    executor::{
        planning::{ExecutionPlan, PlanError, PlannedStep, plan_suites},
        step::{ExecutionSettings, execute_step},
        transport::Transport,
    },
    resolve::{RunContext, eval_condition, find_unresolved_references_in_condition},
};

/// Per-run scheduler options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub settings: ExecutionSettings,
    /// Receives lifecycle events as the run progresses. Send failures are
    /// ignored so a dropped receiver never aborts a run.
    pub event_tx: Option<UnboundedSender<RunEvent>>,
    pub cancel: CancellationToken,
}

impl RunOptions {
    fn emit(&self, event: RunEvent) {
        if let Some(sender) = &self.event_tx {
            let _ = sender.send(event);
        }
    }
}

/// Returns a run identifier derived from the current time.
pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}

/// Plans and runs `suites` in order, sharing one Variable Store.
///
/// Planning errors are returned before any step executes. Everything after
/// that is expressed in the report.
pub async fn run_suites(
    suites: &[SuiteDefinition],
    context: &mut RunContext,
    transport: &dyn Transport,
    options: &RunOptions,
) -> Result<RunReport, PlanError> {
    let suite_refs: Vec<&SuiteDefinition> = suites.iter().collect();
    let plan = plan_suites(&suite_refs)?;
    Ok(execute_plan(&plan, context, transport, options).await)
}

/// Runs independent suites concurrently, each with its own fork of `seed`.
///
/// Qualified dependencies between suites are rejected at planning time since
/// isolated suites never see each other's results. Step reports keep bundle
/// order regardless of completion order.
pub async fn run_isolated(
    suites: Vec<SuiteDefinition>,
    seed: &RunContext,
    transport: Arc<dyn Transport>,
    options: RunOptions,
) -> Result<RunReport, PlanError> {
    for suite in &suites {
        plan_suites(&[suite])?;
    }

    let mut tasks = JoinSet::new();
    let suite_count = suites.len();
    for (index, suite) in suites.into_iter().enumerate() {
        let mut context = seed.fork(format!("{}/{}", seed.run_id, suite.suite), &seed.variables);
        let transport = Arc::clone(&transport);
        let options = options.clone();
        tasks.spawn(async move {
            let plan = plan_suites(&[&suite])?;
            let report = execute_plan(&plan, &mut context, transport.as_ref(), &options).await;
            Ok::<_, PlanError>((index, report))
        });
    }

    let mut reports: Vec<Option<RunReport>> = vec![None; suite_count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                let (index, report) = result?;
                reports[index] = Some(report);
            }
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => warn!(%error, "isolated suite task did not complete"),
        }
    }

    Ok(RunReport::merge(seed.run_id.clone(), reports.into_iter().flatten().collect()))
}

/// Executes an already validated plan step by step.
pub async fn execute_plan(plan: &ExecutionPlan<'_>, context: &mut RunContext, transport: &dyn Transport, options: &RunOptions) -> RunReport {
    let started_at = Utc::now();
    info!(run_id = %context.run_id, step_count = plan.len(), "run started");
    options.emit(RunEvent::RunStarted {
        run_id: context.run_id.clone(),
        at: started_at,
        step_count: plan.len(),
    });

    let mut statuses: HashMap<String, StepStatus> = HashMap::new();
    let mut reports = Vec::with_capacity(plan.len());

    for (index, planned) in plan.steps.iter().enumerate() {
        let suite = planned.suite.suite.as_str();
        let step_id = planned.step.id.as_str();

        let report = if options.cancel.is_cancelled() {
            cancelled_result(suite, step_id, "before it started")
        } else if let Some(blocked) = dependency_block(planned, &statuses) {
            info!(suite, step_id, "step skipped due to dependency");
            blocked
        } else if let Some(skipped) = condition_skip_result(planned, context) {
            info!(suite, step_id, "step skipped by condition");
            skipped
        } else {
            debug!(suite, step_id, "step started");
            options.emit(RunEvent::StepStarted {
                index,
                suite: suite.to_string(),
                step: step_id.to_string(),
                label: planned.step.label().to_string(),
                started_at: Utc::now(),
            });
            tokio::select! {
                biased;
                _ = options.cancel.cancelled() => {
                    warn!(suite, step_id, "step interrupted by cancellation");
                    cancelled_result(suite, step_id, "while it was running")
                }
                report = execute_step(suite, &planned.suite.endpoint, planned.step, context, transport, &options.settings) => report,
            }
        };

        statuses.insert(planned.qualified_id(), report.status);
        options.emit(RunEvent::StepFinished {
            index,
            report: Box::new(report.clone()),
        });
        reports.push(report);
    }

    let cancelled = options.cancel.is_cancelled();
    let report = RunReport::new(context.run_id.clone(), started_at, reports, cancelled);
    let status = if cancelled {
        RunStatus::Cancelled
    } else if report.is_success() {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };

    info!(
        run_id = %report.run_id,
        passed = report.summary.passed,
        failed = report.summary.failed,
        skipped = report.summary.skipped,
        infrastructure_failures = report.summary.infrastructure_failures,
        cancelled,
        "run finished"
    );
    options.emit(RunEvent::RunCompleted {
        status,
        finished_at: report.finished_at,
    });
    report
}

fn dependency_block(planned: &PlannedStep<'_>, statuses: &HashMap<String, StepStatus>) -> Option<StepReport> {
    for dependency in &planned.dependencies {
        let detail = match statuses.get(dependency) {
            Some(StepStatus::Passed) => continue,
            Some(StepStatus::Failed) => "failed earlier in the run",
            Some(StepStatus::Skipped) => "did not execute successfully",
            None => "has not executed yet",
        };
        return Some(StepReport::skipped(
            &planned.suite.suite,
            &planned.step.id,
            FailureKind::Dependency,
            format!("step '{}' skipped because dependency '{}' {}", planned.step.id, dependency, detail),
        ));
    }
    None
}

fn condition_skip_result(planned: &PlannedStep<'_>, context: &RunContext) -> Option<StepReport> {
    let condition = planned.step.r#if.as_ref()?;
    if eval_condition(condition, context) {
        return None;
    }

    let unresolved_references = find_unresolved_references_in_condition(condition, context);
    let log = if unresolved_references.is_empty() {
        format!("step '{}' skipped by condition", planned.step.id)
    } else {
        format!(
            "step '{}' skipped by unresolved condition references: {}",
            planned.step.id,
            unresolved_references.join(", ")
        )
    };
    Some(StepReport::skipped(&planned.suite.suite, &planned.step.id, FailureKind::Condition, log))
}

fn cancelled_result(suite: &str, step_id: &str, when: &str) -> StepReport {
    StepReport::skipped(
        suite,
        step_id,
        FailureKind::Cancelled,
        format!("step '{step_id}' skipped because the run was cancelled {when}"),
    )
}
