//! # Verity Engine
//!
//! The engine loads contract-verification suites, runs their steps against a
//! live service, and reports every step's terminal state.
//!
//! ## Usage
//!
//! ```rust
//! use verity_engine::parse_suite_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let suite_path = temp_dir.path().join("catalog.yaml");
//! std::fs::write(&suite_path, r#"
//! suite: catalog
//! steps:
//!   - id: list
//!     request: { method: GET, path: /catalog }
//! "#)?;
//!
//! let bundle = parse_suite_file(&suite_path)?;
//! assert_eq!(bundle.suites[0].steps.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`store`**: the run-scoped Variable Store
//! - **`resolve`**: template interpolation and condition evaluation
//! - **`contract`**: the Shape Validator
//! - **`executor`**: planning, request preparation, transport, single-step execution
//! - **`workflow`**: the scheduler that drives whole runs

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use verity_types::{SuiteBundle, SuiteDefinition};

pub mod contract;
pub mod executor;
pub mod resolve;
pub mod store;
pub mod templates;
pub mod workflow;

pub use contract::validate;
pub use executor::{
    ExecutionPlan, ExecutionSettings, HttpRequest, HttpResponse, PlanError, PlannedStep, ReqwestTransport, Transport, TransportError,
    execute_step, plan_suites,
};
pub use resolve::RunContext;
pub use store::{VariableSlot, VariableStore};
pub use workflow::{RunOptions, generate_run_id, run_isolated, run_suites};

/// Loads a suite document from the filesystem.
///
/// The document holds either several suites under `suites:` or a single
/// suite with `suite:` and `steps:` at the top level. JSON documents are
/// accepted as well.
pub fn parse_suite_file(file_path: impl AsRef<Path>) -> Result<SuiteBundle> {
    let file_path = file_path.as_ref();
    let file_content = fs::read(file_path).with_context(|| format!("failed to read suite file: {}", file_path.display()))?;
    parse_suite_str(&String::from_utf8_lossy(&file_content)).with_context(|| format!("failed to parse suite file: {}", file_path.display()))
}

/// Parses suite document text. See [`parse_suite_file`].
pub fn parse_suite_str(content: &str) -> Result<SuiteBundle> {
    // Multi-suite first so a bundle is never accepted as a single suite with
    // ignored fields.
    #[derive(Deserialize)]
    struct MultiSuiteDocument {
        suites: Vec<SuiteDefinition>,
    }

    if let Ok(document) = serde_yaml::from_str::<MultiSuiteDocument>(content) {
        return Ok(SuiteBundle { suites: document.suites });
    }

    match serde_yaml::from_str::<SuiteDefinition>(content) {
        Ok(suite) => Ok(SuiteBundle { suites: vec![suite] }),
        Err(error) => anyhow::bail!(
            "unsupported suite document format ({error}). Expected one of:\n\
             - a single suite with 'suite' and 'steps' fields\n\
             - several suites under a 'suites' key"
        ),
    }
}

/// Loads and concatenates several suite files, preserving file order.
pub fn load_suites<P: AsRef<Path>>(paths: &[P]) -> Result<SuiteBundle> {
    let mut bundle = SuiteBundle::default();
    for path in paths {
        bundle.extend(parse_suite_file(path)?);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use verity_types::{CaptureSource, EqualsTarget, FieldFormat, HttpMethod};

    use super::*;

    #[test]
    fn parse_single_suite_file() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let suite_path = temp_dir.path().join("auth.yaml");
        fs::write(
            &suite_path,
            r#"
suite: auth
endpoint: seller
steps:
  - id: login
    request:
      method: POST
      path: /auth/login
      body: { phone: "${{ env.SELLER_PHONE }}", otp: "1234" }
    expect:
      status: [200, 201]
      contract:
        fields:
          - path: data.token
            type: string
          - path: data.user.phone
            format: phone
          - path: data.user.phone
            equals: { value: "${{ env.SELLER_PHONE }}" }
    capture:
      - name: token
        path: data.token
        required: true
      - name: status
        from: status
"#,
        )
        .expect("write suite");

        let bundle = parse_suite_file(&suite_path).expect("parse suite");
        let suite = &bundle.suites[0];
        assert_eq!(suite.suite, "auth");
        assert_eq!(suite.endpoint, "seller");
        let login = &suite.steps[0];
        assert_eq!(login.request.method, HttpMethod::Post);
        assert_eq!(login.expect.status, vec![200, 201]);
        assert_eq!(login.expect.contract.fields[1].format, Some(FieldFormat::Phone));
        assert!(matches!(login.expect.contract.fields[2].equals, Some(EqualsTarget::Value(_))));
        assert_eq!(login.capture[1].from, CaptureSource::Status);
    }

    #[test]
    fn parse_multi_suite_document_keeps_order() {
        let bundle = parse_suite_str(
            r#"
suites:
  - suite: catalog
    steps: []
  - suite: buyer
    steps:
      - id: browse
        depends_on: [catalog.create]
"#,
        )
        .expect("parse bundle");
        let ids: Vec<&str> = bundle.suites.iter().map(|suite| suite.suite.as_str()).collect();
        assert_eq!(ids, vec!["catalog", "buyer"]);
        assert_eq!(bundle.suites[1].steps[0].depends_on, vec!["catalog.create".to_string()]);
    }

    #[test]
    fn json_documents_are_accepted() {
        let bundle = parse_suite_str(r#"{"suite": "health", "steps": [{"id": "ping", "request": {"path": "/ping"}}]}"#).expect("parse json");
        assert_eq!(bundle.suites[0].steps[0].request.path, "/ping");
    }

    #[test]
    fn unknown_document_shape_is_rejected() {
        let error = parse_suite_str("title: nothing here").expect_err("should fail");
        assert!(error.to_string().contains("unsupported suite document format"));
    }

    #[test]
    fn load_suites_concatenates_files() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let first = temp_dir.path().join("a.yaml");
        let second = temp_dir.path().join("b.yaml");
        fs::write(&first, "suite: a\nsteps: []\n").expect("write a");
        fs::write(&second, "suite: b\nsteps: []\n").expect("write b");

        let bundle = load_suites(&[first, second]).expect("load");
        assert!(bundle.find("a").is_some());
        assert_eq!(bundle.suites[1].suite, "b");
    }
}
