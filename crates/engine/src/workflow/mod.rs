//! Run orchestration.

pub mod scheduler;

pub use scheduler::{RunOptions, execute_plan, generate_run_id, run_isolated, run_suites};
