//! Suite and step definitions.
//!
//! A suite is an ordered list of steps that exercise one backend area (for
//! example catalog management or buyer checkout). Each step is one HTTP call,
//! an expectation about its response, and a set of capture rules that feed the
//! run's variable store. Definitions are immutable once loaded.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::ShapeContract;

/// Name of the endpoint used when a suite does not declare one.
pub const DEFAULT_ENDPOINT: &str = "default";

fn default_endpoint_name() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// A collection of suites loaded from one or more documents.
///
/// Suite order is preserved; suites sharing a run execute in this order.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SuiteBundle {
    /// Ordered suite definitions.
    #[serde(default)]
    pub suites: Vec<SuiteDefinition>,
}

impl SuiteBundle {
    /// Finds a suite by identifier.
    pub fn find(&self, suite_id: &str) -> Option<&SuiteDefinition> {
        self.suites.iter().find(|suite| suite.suite == suite_id)
    }

    /// Appends every suite of `other`, keeping declaration order.
    pub fn extend(&mut self, other: SuiteBundle) {
        self.suites.extend(other.suites);
    }
}

/// A named, ordered group of verification steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteDefinition {
    /// Canonical suite identifier (for example `catalog_crud`).
    pub suite: String,
    /// Optional human-readable title.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional descriptive copy.
    #[serde(default)]
    pub description: Option<String>,
    /// Configured endpoint this suite targets.
    #[serde(default = "default_endpoint_name")]
    pub endpoint: String,
    /// Steps in declaration order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl Default for SuiteDefinition {
    fn default() -> Self {
        Self {
            suite: String::new(),
            title: None,
            description: None,
            endpoint: default_endpoint_name(),
            steps: Vec::new(),
        }
    }
}

/// One HTTP call plus its response validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StepDefinition {
    /// Step identifier, unique within its suite.
    pub id: String,
    /// Optional label used in reports.
    #[serde(default)]
    pub title: Option<String>,
    /// Ordering hint among steps without a dependency relationship (ascending).
    #[serde(default)]
    pub priority: i32,
    /// Steps that must reach a terminal state first. `suite.step` refers to an
    /// earlier suite in the same run.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional condition; when false the step is skipped without a request.
    #[serde(default, rename = "if")]
    pub r#if: Option<String>,
    /// The HTTP call descriptor.
    #[serde(default)]
    pub request: HttpCall,
    /// Expected status codes, latency ceiling, and response shape.
    #[serde(default)]
    pub expect: Expectation,
    /// Values extracted into the variable store after validation.
    #[serde(default)]
    pub capture: Vec<CaptureRule>,
}

impl StepDefinition {
    /// Label used in logs and reports.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(self.id.as_str())
    }
}

/// HTTP verbs supported by step requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Request template for a step.
///
/// String values anywhere in the call may contain `${{ ... }}` templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpCall {
    #[serde(default)]
    pub method: HttpMethod,
    /// Path relative to the endpoint base URL, e.g. `/catalog/{catalogId}`.
    pub path: String,
    /// Values substituted into `{name}` placeholders of `path` (percent-encoded).
    #[serde(default)]
    pub path_params: IndexMap<String, Value>,
    /// Extra headers merged over the endpoint defaults.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Query parameters.
    #[serde(default)]
    pub query: IndexMap<String, Value>,
    /// Optional JSON body.
    #[serde(default)]
    pub body: Option<Value>,
    /// Per-request timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for HttpCall {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            path: "/".to_string(),
            path_params: IndexMap::new(),
            headers: IndexMap::new(),
            query: IndexMap::new(),
            body: None,
            timeout_ms: None,
        }
    }
}

fn default_status_set() -> Vec<u16> {
    vec![200]
}

/// What a step expects from its response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expectation {
    /// Accepted status codes (some endpoints answer 200 or 201).
    #[serde(default = "default_status_set")]
    pub status: Vec<u16>,
    /// Response-time ceiling overriding the configured default.
    #[serde(default)]
    pub max_elapsed_ms: Option<u64>,
    /// Expected response header values; a trailing `*` matches a prefix.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Shape contract for the decoded body.
    #[serde(default)]
    pub contract: ShapeContract,
    /// When true an empty body is accepted even if the contract has fields.
    #[serde(default)]
    pub allow_empty_body: bool,
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            status: default_status_set(),
            max_elapsed_ms: None,
            headers: IndexMap::new(),
            contract: ShapeContract::default(),
            allow_empty_body: false,
        }
    }
}

/// Where a capture rule reads its value from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// A path inside the decoded body.
    #[default]
    Body,
    /// A response header (path is the header name).
    Header,
    /// The numeric status code.
    Status,
    /// Elapsed time in milliseconds.
    Elapsed,
}

/// Instruction to write a response value into a variable slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CaptureRule {
    /// Variable slot written by this rule.
    pub name: String,
    #[serde(default)]
    pub from: CaptureSource,
    /// Body path (`data[0]._id`) or header name. Ignored for status/elapsed.
    #[serde(default)]
    pub path: Option<String>,
    /// When true, an absent value is reported as a violation.
    #[serde(default)]
    pub required: bool,
    /// Literal written when the value is absent and the rule is not required.
    #[serde(default)]
    pub default: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_defaults_accept_status_200_and_get() {
        let yaml = r#"
id: list_catalogs
request:
  path: /catalog
"#;
        let step: StepDefinition = serde_yaml::from_str(yaml).expect("parse step");
        assert_eq!(step.request.method, HttpMethod::Get);
        assert_eq!(step.expect.status, vec![200]);
        assert_eq!(step.priority, 0);
        assert!(step.capture.is_empty());
        assert_eq!(step.label(), "list_catalogs");
    }

    #[test]
    fn suite_defaults_to_default_endpoint() {
        let yaml = r#"
suite: catalog
steps: []
"#;
        let suite: SuiteDefinition = serde_yaml::from_str(yaml).expect("parse suite");
        assert_eq!(suite.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn capture_rule_parses_header_source() {
        let yaml = r#"
name: requestId
from: header
path: x-request-id
"#;
        let rule: CaptureRule = serde_yaml::from_str(yaml).expect("parse capture");
        assert_eq!(rule.from, CaptureSource::Header);
        assert_eq!(rule.path.as_deref(), Some("x-request-id"));
        assert!(!rule.required);
    }
}
