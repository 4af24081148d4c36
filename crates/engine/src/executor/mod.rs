//! Step execution: planning, request preparation, transport, validation and
//! capture.
//!
//! - `planning` orders steps by dependency and priority
//! - `prepare` interpolates a step into a concrete [`HttpRequest`]
//! - `transport::Transport` abstracts how a request reaches the service
//! - `step::execute_step` runs one step end to end and returns its report

pub mod capture;
pub mod planning;
pub mod prepare;
pub mod step;
pub mod transport;

pub use capture::{CaptureOutcome, apply_captures};
pub use planning::{ExecutionPlan, PlanError, PlannedStep, plan_suites};
pub use prepare::{collect_unresolved_step_templates, prepare_request};
pub use step::{ExecutionSettings, execute_step};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
