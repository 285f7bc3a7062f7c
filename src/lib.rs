//! hooktest - end-to-end tests for HTTP APIs with webhook callbacks
//!
//! This library loads suites of HTTP steps, runs them against an API, and
//! collects and verifies the asynchronous callbacks the API sends back.

pub mod callback;
pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod common;
pub mod executor;
pub mod http;
pub mod suite;
pub mod template;
pub mod value;

// Re-export commonly used types for tests
pub use common::{Error, Result, StepError};
