//! One synchronous request/response exchange with the API under test
//!
//! The executor only sees the `RoundTripper` trait; the reqwest-backed
//! implementation lives in `client`, and tests substitute their own.

pub mod client;
pub mod method;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::ReqwestRoundTripper;
pub use method::HttpMethod;

/// A request ready to send: URL fully rendered, body fully templated
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

/// Status and raw body of a response; decoding is left to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Body as text, for error messages
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network-level failure; never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to send {method} {url}: {message}")]
    Send {
        method: HttpMethod,
        url: String,
        message: String,
    },

    #[error("failed to read response body from {url}: {message}")]
    ReadBody { url: String, message: String },
}

/// Performs a single HTTP exchange
#[async_trait]
pub trait RoundTripper: Send + Sync {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
