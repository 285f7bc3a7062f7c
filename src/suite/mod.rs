//! Suite loading and execution
//!
//! Runs suites of HTTP steps described in JSON or YAML files.

pub mod config;
pub mod report;
pub mod runner;

pub use config::{Suite, TestStep};
pub use report::{write_report, StepOutcome, SuiteReport};
pub use runner::{run_suite, SuiteRunner};
