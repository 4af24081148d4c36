//! Shared type definitions for the Verity contract-verification harness.
//!
//! Everything in this crate is plain serializable data. Suites and contracts
//! are authored in YAML or JSON and deserialize straight into these types;
//! reports serialize back out for external renderers.

pub mod config;
pub mod contract;
pub mod events;
pub mod report;
pub mod suite;

pub use config::{AuthConfig, AuthScheme, EndpointConfig, HarnessConfig};
pub use contract::{EqualsTarget, FieldFormat, FieldRule, FieldType, ShapeContract, Violation};
pub use events::{RunEvent, RunStatus};
pub use report::{FailureKind, RunReport, RunSummary, StepReport, StepStatus};
pub use suite::{CaptureRule, CaptureSource, Expectation, HttpCall, HttpMethod, StepDefinition, SuiteBundle, SuiteDefinition};
