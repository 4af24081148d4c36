//! Step ordering and dependency planning.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;
use verity_types::{StepDefinition, SuiteDefinition};

/// Problems that make a suite impossible to schedule. Raised before any
/// step runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate suite identifier detected: '{suite}'")]
    DuplicateSuite { suite: String },

    #[error("duplicate step identifier detected in suite '{suite}': '{step}'")]
    DuplicateStep { suite: String, step: String },

    #[error("step '{step}' in suite '{suite}' has an invalid identifier (must be non-empty and contain no '.')")]
    InvalidStepId { suite: String, step: String },

    #[error("step '{step}' in suite '{suite}' depends on unknown step '{dependency}'")]
    UnknownDependency { suite: String, step: String, dependency: String },

    #[error("step '{step}' in suite '{suite}' cannot depend on itself")]
    SelfDependency { suite: String, step: String },

    #[error("cycle detected in suite '{suite}' involving: {}", steps.join(", "))]
    Cycle { suite: String, steps: Vec<String> },
}

/// A step placed in execution order, with dependencies qualified as
/// `suite.step`.
#[derive(Debug, Clone)]
pub struct PlannedStep<'a> {
    pub suite: &'a SuiteDefinition,
    pub step: &'a StepDefinition,
    pub dependencies: Vec<String>,
}

impl PlannedStep<'_> {
    pub fn qualified_id(&self) -> String {
        qualify(&self.suite.suite, &self.step.id)
    }
}

/// Ordered steps for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan<'a> {
    pub steps: Vec<PlannedStep<'a>>,
}

impl ExecutionPlan<'_> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

pub fn qualify(suite: &str, step: &str) -> String {
    format!("{suite}.{step}")
}

/// Plans several suites that share one run, in the given order.
///
/// A dependency written `other_suite.step` may point at a step of any
/// suite earlier in `suites`; since suites run in order, such steps are
/// always terminal by the time the dependent is considered.
pub fn plan_suites<'a>(suites: &[&'a SuiteDefinition]) -> Result<ExecutionPlan<'a>, PlanError> {
    let mut seen_suites = HashSet::new();
    let mut earlier_steps: HashSet<String> = HashSet::new();
    let mut plan = ExecutionPlan::default();

    for suite in suites {
        if !seen_suites.insert(suite.suite.as_str()) {
            return Err(PlanError::DuplicateSuite {
                suite: suite.suite.clone(),
            });
        }
        let ordered = order_suite_steps(suite, &earlier_steps)?;
        earlier_steps.extend(ordered.iter().map(PlannedStep::qualified_id));
        plan.steps.extend(ordered);
    }

    Ok(plan)
}

/// Build a topologically ordered step list for one suite.
///
/// Kahn's algorithm; among ready steps the lowest `(priority, declaration
/// index)` goes first, which makes the order reproducible. Returns an error
/// for duplicate or invalid identifiers, unknown dependencies,
/// self-dependencies, or cycles.
pub fn order_suite_steps<'a>(suite: &'a SuiteDefinition, external: &HashSet<String>) -> Result<Vec<PlannedStep<'a>>, PlanError> {
    let suite_id = suite.suite.as_str();
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (index, step) in suite.steps.iter().enumerate() {
        if step.id.is_empty() || step.id.contains('.') {
            return Err(PlanError::InvalidStepId {
                suite: suite_id.to_string(),
                step: step.id.clone(),
            });
        }
        if index_of.insert(step.id.as_str(), index).is_some() {
            return Err(PlanError::DuplicateStep {
                suite: suite_id.to_string(),
                step: step.id.clone(),
            });
        }
    }

    let mut in_degrees = vec![0usize; suite.steps.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); suite.steps.len()];
    let mut qualified_dependencies: Vec<Vec<String>> = vec![Vec::new(); suite.steps.len()];

    for (index, step) in suite.steps.iter().enumerate() {
        let mut seen_dependencies = HashSet::new();
        for dependency in &step.depends_on {
            let local = match dependency.split_once('.') {
                Some((dependency_suite, dependency_step)) if dependency_suite == suite_id => Some(dependency_step),
                Some(_) => None,
                None => Some(dependency.as_str()),
            };

            let qualified = match local {
                Some(local_id) => {
                    if local_id == step.id {
                        return Err(PlanError::SelfDependency {
                            suite: suite_id.to_string(),
                            step: step.id.clone(),
                        });
                    }
                    let Some(&dependency_index) = index_of.get(local_id) else {
                        return Err(unknown_dependency(suite_id, step, dependency));
                    };
                    if seen_dependencies.insert(dependency_index) {
                        in_degrees[index] += 1;
                        adjacency[dependency_index].push(index);
                    }
                    qualify(suite_id, local_id)
                }
                None => {
                    if !external.contains(dependency) {
                        return Err(unknown_dependency(suite_id, step, dependency));
                    }
                    dependency.clone()
                }
            };
            if !qualified_dependencies[index].contains(&qualified) {
                qualified_dependencies[index].push(qualified);
            }
        }
    }

    let mut ready: BTreeSet<(i32, usize)> = suite
        .steps
        .iter()
        .enumerate()
        .filter(|(index, _)| in_degrees[*index] == 0)
        .map(|(index, step)| (step.priority, index))
        .collect();

    let mut ordered = Vec::with_capacity(suite.steps.len());
    while let Some((_, index)) = ready.pop_first() {
        ordered.push(index);
        for &child in &adjacency[index] {
            in_degrees[child] -= 1;
            if in_degrees[child] == 0 {
                ready.insert((suite.steps[child].priority, child));
            }
        }
    }

    if ordered.len() != suite.steps.len() {
        let mut remaining: Vec<String> = in_degrees
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| suite.steps[index].id.clone())
            .collect();
        remaining.sort();
        return Err(PlanError::Cycle {
            suite: suite_id.to_string(),
            steps: remaining,
        });
    }

    Ok(ordered
        .into_iter()
        .map(|index| PlannedStep {
            suite,
            step: &suite.steps[index],
            dependencies: std::mem::take(&mut qualified_dependencies[index]),
        })
        .collect())
}

fn unknown_dependency(suite: &str, step: &StepDefinition, dependency: &str) -> PlanError {
    PlanError::UnknownDependency {
        suite: suite.to_string(),
        step: step.id.clone(),
        dependency: dependency.to_string(),
    }
}
