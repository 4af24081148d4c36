//! Capture rules: copy values out of a response into the Variable Store.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};
use verity_types::{CaptureRule, CaptureSource, Violation};

use super::transport::HttpResponse;
use crate::{resolve::select_path, store::VariableStore};

/// Outcome of applying a step's capture rules.
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    pub captured: IndexMap<String, Value>,
    pub violations: Vec<Violation>,
    pub logs: Vec<String>,
}

/// Applies capture rules in declaration order, writing into `store`.
///
/// A missing source value writes the rule's `default` when one is declared.
/// A missing required value is reported as a `capture` constraint violation
/// and leaves the slot untouched.
pub fn apply_captures(
    rules: &[CaptureRule],
    response: &HttpResponse,
    body: &Value,
    writer: &str,
    store: &mut VariableStore,
) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();

    for rule in rules {
        let value = match rule.from {
            CaptureSource::Body => select_path(body, rule.path.as_deref()),
            CaptureSource::Header => rule
                .path
                .as_deref()
                .and_then(|name| response.headers.get(&name.to_ascii_lowercase()))
                .map(|value| Value::String(value.clone())),
            CaptureSource::Status => Some(Value::from(response.status)),
            CaptureSource::Elapsed => Some(Value::from(u64::try_from(response.elapsed.as_millis()).unwrap_or(u64::MAX))),
        };

        let value = match (value, &rule.default) {
            (Some(value), _) => value,
            (None, Some(default)) if !rule.required => {
                outcome
                    .logs
                    .push(format!("capture '{}' used default: source value absent", rule.name));
                default.clone()
            }
            (None, _) => {
                let source = rule.path.as_deref().unwrap_or("<root>");
                if rule.required {
                    warn!(slot = %rule.name, source, "required capture missing");
                    outcome.violations.push(Violation::ConstraintViolation {
                        path: format!("capture.{}", rule.name),
                        constraint: "capture".to_string(),
                        detail: format!("required capture source '{source}' is absent"),
                    });
                } else {
                    outcome.logs.push(format!("capture '{}' skipped: '{}' is absent", rule.name, source));
                }
                continue;
            }
        };

        debug!(slot = %rule.name, writer, "captured value");
        store.set(rule.name.as_str(), value.clone(), writer);
        outcome.captured.insert(rule.name.clone(), value);
    }

    outcome
}
