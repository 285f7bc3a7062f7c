//! Error types for hooktest
//!
//! Every failure that escapes a step carries the step's identity and the
//! sub-operation that failed, so the message printed by the CLI reads as a
//! chain: step, component, literal expected/actual values.

use std::io;
use thiserror::Error;

use crate::callback::signature::SignatureError;
use crate::http::TransportError;
use crate::template::TemplateError;
use crate::value::{PathError, StoreError};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hooktest
#[derive(Error, Debug)]
pub enum Error {
    // === Suite Errors ===
    #[error("Invalid suite: {0}")]
    InvalidSuite(String),

    #[error("Failed to parse suite '{path}': {message}")]
    SuiteParse { path: String, message: String },

    #[error("Unknown setup routine '{routine}' referenced by test_case '{step}'")]
    UnknownSetupRoutine { routine: String, step: String },

    #[error("Suite '{name}' failed: {message}")]
    SuiteFailed { name: String, message: String },

    // === Step Errors ===
    #[error("{step}: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    // === Callback Listener Errors ===
    #[error("Failed to bind callback listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to load callback TLS material: {0}")]
    ListenerTls(String),

    #[error("Callback listener did not shut down within {0} seconds")]
    ListenerShutdownTimeout(u64),

    #[error("Invalid signature configuration: {0}")]
    SignatureConfig(#[source] SignatureError),

    // === Cleanup Errors ===
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a step failure with the step's identity
    pub fn step_failed(step: impl Into<String>, source: StepError) -> Self {
        Self::StepFailed {
            step: step.into(),
            source,
        }
    }

    /// Create an invalid suite error
    pub fn invalid_suite(message: impl Into<String>) -> Self {
        Self::InvalidSuite(message.into())
    }

    /// The step failure behind this error, if any
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure of a single step, in the order the executor can hit them
#[derive(Error, Debug)]
pub enum StepError {
    #[error("failed to process url with variable store: {0}")]
    UrlTemplate(#[source] TemplateError),

    #[error("failed to inject callback id into request body: {0}")]
    CallbackInjection(#[source] PathError),

    #[error("failed to process request body with variable store: {0}")]
    BodyTemplate(#[source] TemplateError),

    #[error("{0}")]
    Transport(#[source] TransportError),

    #[error("wants status code {expected} but got status code {actual}, response body: {body}")]
    StatusMismatch {
        expected: u16,
        actual: u16,
        body: String,
    },

    #[error("wants response body but got no response body")]
    MissingResponseBody,

    #[error("does not want a response body but got a response body: '{body}'")]
    UnexpectedResponseBody { body: String },

    #[error("failed to decode response body: {message}: response body: {body}")]
    ResponseDecode { message: String, body: String },

    #[error("failed to store response variables: {0}")]
    Capture(#[source] StoreError),

    #[error("callback expected but no callback listener is configured")]
    NoCallbackListener,

    #[error("callback listener closed after {received} of {expected} callbacks")]
    ListenerClosed { expected: u32, received: u32 },

    #[error("callback could not be decoded: {0}")]
    CallbackDecode(String),

    #[error("incorrect callback_id: expected_callback_id '{expected}', got_callback_id '{actual}'")]
    CallbackMismatch { expected: String, actual: String },

    #[error("callback signature verification failed: {0}")]
    Signature(#[source] SignatureError),

    #[error("received {received} of {expected} callbacks before max callback wait of {waited_secs}s elapsed")]
    CallbackTimeout {
        expected: u32,
        received: u32,
        waited_secs: u64,
    },

    #[error("cleanup after step failed: {0}")]
    Cleanup(String),
}
