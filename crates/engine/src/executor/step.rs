//! Single-step execution: resolve, send, decode, validate, capture.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use verity_types::{
    Expectation, FailureKind, FieldRule, FieldType, HarnessConfig, ShapeContract, StepDefinition, StepReport, StepStatus, Violation,
    config::DEFAULT_MAX_ELAPSED_MS,
};
use verity_util::decode_response_body;

use super::{
    capture::apply_captures,
    prepare::{collect_unresolved_step_templates, prepare_request, resolve_contract},
    transport::{HttpResponse, Transport},
};
use crate::{contract::validate, resolve::RunContext};

/// Run-wide knobs the executor needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Response-time ceiling for steps that declare none.
    pub default_max_elapsed_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_max_elapsed_ms: DEFAULT_MAX_ELAPSED_MS,
        }
    }
}

impl From<&HarnessConfig> for ExecutionSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            default_max_elapsed_ms: config.default_max_elapsed_ms,
        }
    }
}

/// Executes one step against `endpoint` and returns its terminal report.
///
/// Never returns an error: every failure mode is expressed in the report.
/// Transport failures produce `Failed` / `Infrastructure` with no capture;
/// unresolved templates fail the step before any request is sent.
pub async fn execute_step(
    suite: &str,
    endpoint: &str,
    step: &StepDefinition,
    context: &mut RunContext,
    transport: &dyn Transport,
    settings: &ExecutionSettings,
) -> StepReport {
    let started_at = Utc::now();
    let mut report = StepReport {
        suite: suite.to_string(),
        step: step.id.clone(),
        status: StepStatus::Failed,
        failure: None,
        http_status: None,
        elapsed_ms: 0,
        violations: Vec::new(),
        captured: Default::default(),
        logs: Vec::new(),
        started_at: Some(started_at),
    };

    let unresolved = collect_unresolved_step_templates(step, context);
    if !unresolved.is_empty() {
        warn!(suite, step_id = %step.id, count = unresolved.len(), "step failed due to unresolved templates");
        report.failure = Some(FailureKind::Assertion);
        report
            .logs
            .push(format!("step '{}' failed before execution: unresolved template references", step.id));
        report.logs.extend(unresolved.iter().map(|entry| entry.describe()));
        return report;
    }

    let request = prepare_request(step, endpoint, context);
    debug!(suite, step_id = %step.id, method = request.method.as_str(), path = %request.path, "step request prepared");
    report.logs.push(format!("{} {}", request.method.as_str(), request.path));

    let response = match transport.send(request).await {
        Ok(response) => response,
        Err(error) => {
            warn!(suite, step_id = %step.id, %error, "step failed at transport");
            report.failure = Some(FailureKind::Infrastructure);
            report.elapsed_ms = elapsed_since(started_at);
            report.logs.push(format!("infrastructure failure: {error}"));
            return report;
        }
    };

    let elapsed_ms = u64::try_from(response.elapsed.as_millis()).unwrap_or(u64::MAX);
    report.http_status = Some(response.status);
    report.elapsed_ms = elapsed_ms;

    let mut violations = validate(
        &synthetic_document(&response, elapsed_ms),
        &expectation_contract(&step.expect, settings),
    );

    let contract = resolve_contract(&step.expect.contract, context);
    let body = match decode_response_body(&response.body, response.status) {
        Ok(body) => {
            if !(body.is_null() && step.expect.allow_empty_body) {
                violations.extend(validate(&body, &contract));
            }
            body
        }
        Err(error) => {
            report.logs.push(error.to_string());
            if !contract.is_empty() {
                violations.push(Violation::ConstraintViolation {
                    path: "$body".to_string(),
                    constraint: "decode".to_string(),
                    detail: format!("response body is not valid JSON: {}", error.body_preview),
                });
            }
            Value::Null
        }
    };

    context.record_step(
        suite,
        &step.id,
        json!({
            "status": response.status,
            "body": body,
            "headers": response.headers,
            "elapsed_ms": elapsed_ms,
        }),
    );

    let writer = format!("{suite}.{}", step.id);
    let capture = apply_captures(&step.capture, &response, &body, &writer, &mut context.variables);
    violations.extend(capture.violations);
    report.logs.extend(capture.logs);
    report.captured = capture.captured;

    if violations.is_empty() {
        report.status = StepStatus::Passed;
        info!(suite, step_id = %step.id, status = response.status, elapsed_ms, "step passed");
    } else {
        report.failure = Some(FailureKind::Assertion);
        info!(
            suite,
            step_id = %step.id,
            status = response.status,
            elapsed_ms,
            violations = violations.len(),
            "step failed assertions"
        );
    }
    report.violations = violations;
    report
}

fn elapsed_since(started_at: chrono::DateTime<Utc>) -> u64 {
    u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or(0)
}

/// Status, elapsed time, and headers as a document the validator can check.
fn synthetic_document(response: &HttpResponse, elapsed_ms: u64) -> Value {
    json!({
        "$status": response.status,
        "$elapsed_ms": elapsed_ms,
        "$headers": response.headers,
    })
}

/// Expresses the status set, response-time ceiling, and expected headers as
/// ordinary rules over the synthetic document.
fn expectation_contract(expect: &Expectation, settings: &ExecutionSettings) -> ShapeContract {
    let mut fields = Vec::new();
    if !expect.status.is_empty() {
        fields.push(FieldRule {
            path: "$status".to_string(),
            allowed_values: expect.status.iter().map(|status| Value::from(*status)).collect(),
            ..Default::default()
        });
    }
    fields.push(FieldRule {
        path: "$elapsed_ms".to_string(),
        field_type: Some(FieldType::Integer),
        exclusive_maximum: Some(expect.max_elapsed_ms.unwrap_or(settings.default_max_elapsed_ms) as f64),
        ..Default::default()
    });
    for (name, expected) in &expect.headers {
        let pattern = match expected.strip_suffix('*') {
            Some(prefix) => format!("^{}", regex::escape(prefix)),
            None => format!("^{}$", regex::escape(expected)),
        };
        fields.push(FieldRule {
            path: format!("$headers.{}", name.to_ascii_lowercase()),
            pattern: Some(pattern),
            ..Default::default()
        });
    }
    ShapeContract { root: None, fields }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use indexmap::IndexMap;
    use verity_types::{CaptureRule, FieldFormat, HttpCall};

    use super::*;
    use crate::executor::transport::{HttpRequest, TransportError};

    struct ScriptedTransport {
        status: u16,
        body: &'static str,
        elapsed: Duration,
        calls: AtomicUsize,
        last_request: Mutex<Option<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                elapsed: Duration::from_millis(40),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("lock") = Some(request);
            let mut headers = IndexMap::new();
            headers.insert("content-type".to_string(), "application/json; charset=utf-8".to_string());
            Ok(HttpResponse {
                status: self.status,
                headers,
                elapsed: self.elapsed,
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connect {
                message: "connection refused".into(),
            })
        }
    }

    fn create_catalog_step() -> StepDefinition {
        StepDefinition {
            id: "create".into(),
            request: HttpCall {
                method: verity_types::HttpMethod::Post,
                path: "/catalog".into(),
                body: Some(json!({"title": "Summer ${{ run.id }}"})),
                ..Default::default()
            },
            expect: Expectation {
                status: vec![200, 201],
                headers: IndexMap::from([("Content-Type".to_string(), "application/json*".to_string())]),
                contract: ShapeContract {
                    root: Some(FieldType::Object),
                    fields: vec![FieldRule {
                        path: "data._id".into(),
                        format: Some(FieldFormat::ObjectId),
                        ..Default::default()
                    }],
                },
                ..Default::default()
            },
            capture: vec![CaptureRule {
                name: "catalogId".into(),
                path: Some("data._id".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn passing_step_captures_and_records_response() {
        let transport = ScriptedTransport::new(201, r#"{"data": {"_id": "65f0c1d2e3a4b5c6d7e8f901"}}"#);
        let mut context = RunContext::new("run-1");

        let report = execute_step(
            "catalog",
            "default",
            &create_catalog_step(),
            &mut context,
            &transport,
            &ExecutionSettings::default(),
        )
        .await;

        assert_eq!(report.status, StepStatus::Passed, "{:?}", report.violations);
        assert_eq!(report.http_status, Some(201));
        assert_eq!(report.elapsed_ms, 40);
        assert_eq!(context.variables.get_str("catalogId"), Some("65f0c1d2e3a4b5c6d7e8f901"));
        assert_eq!(context.steps["catalog.create"]["status"], json!(201));
        let sent = transport.last_request.lock().expect("lock").clone().expect("request sent");
        assert_eq!(sent.body, Some(json!({"title": "Summer run-1"})));
    }

    #[tokio::test]
    async fn unexpected_status_and_slow_response_are_violations() {
        let mut transport = ScriptedTransport::new(500, r#"{"data": {"_id": "65f0c1d2e3a4b5c6d7e8f901"}}"#);
        transport.elapsed = Duration::from_millis(4_000);
        let mut context = RunContext::default();

        let report = execute_step(
            "catalog",
            "default",
            &create_catalog_step(),
            &mut context,
            &transport,
            &ExecutionSettings::default(),
        )
        .await;

        assert_eq!(report.status, StepStatus::Failed);
        assert_eq!(report.failure, Some(FailureKind::Assertion));
        let paths: Vec<&str> = report.violations.iter().map(Violation::path).collect();
        assert_eq!(paths, vec!["$status", "$elapsed_ms"]);
        // Assertion failures still capture.
        assert!(context.variables.contains("catalogId"));
    }

    #[tokio::test]
    async fn transport_failure_is_infrastructure_and_skips_capture() {
        let mut context = RunContext::default();
        let report = execute_step(
            "catalog",
            "default",
            &create_catalog_step(),
            &mut context,
            &RefusingTransport,
            &ExecutionSettings::default(),
        )
        .await;

        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.is_infrastructure_failure());
        assert!(context.variables.is_empty());
        assert!(!context.steps.contains_key("catalog.create"));
        assert!(context.steps.is_empty());
    }

    #[tokio::test]
    async fn response_at_the_ceiling_is_too_slow() {
        let mut transport = ScriptedTransport::new(201, r#"{"data": {"_id": "65f0c1d2e3a4b5c6d7e8f901"}}"#);
        transport.elapsed = Duration::from_millis(DEFAULT_MAX_ELAPSED_MS);
        let mut context = RunContext::default();

        let report = execute_step(
            "catalog",
            "default",
            &create_catalog_step(),
            &mut context,
            &transport,
            &ExecutionSettings::default(),
        )
        .await;

        assert_eq!(report.status, StepStatus::Failed);
        assert!(matches!(
            report.violations.as_slice(),
            [Violation::ConstraintViolation { path, constraint, .. }] if path == "$elapsed_ms" && constraint == "exclusive_maximum"
        ));
    }

    #[tokio::test]
    async fn unresolved_template_fails_before_sending() {
        let transport = ScriptedTransport::new(200, "{}");
        let mut step = create_catalog_step();
        step.request.path = "/catalog/${{ vars.catalogId }}".into();
        let mut context = RunContext::default();

        let report = execute_step("catalog", "default", &step, &mut context, &transport, &ExecutionSettings::default()).await;

        assert_eq!(report.status, StepStatus::Failed);
        assert_eq!(report.failure, Some(FailureKind::Assertion));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(report.logs.iter().any(|line| line.contains("vars.catalogId")));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_violation() {
        let transport = ScriptedTransport::new(201, "<html>oops</html>");
        let mut context = RunContext::default();
        let report = execute_step(
            "catalog",
            "default",
            &create_catalog_step(),
            &mut context,
            &transport,
            &ExecutionSettings::default(),
        )
        .await;
        assert!(report.violations.iter().any(|violation| violation.path() == "$body"));
    }
}
