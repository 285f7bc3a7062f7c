//! reqwest-backed round tripper

use std::time::Duration;

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, RoundTripper, TransportError};
use crate::common::{Error, Result};

pub struct ReqwestRoundTripper {
    client: reqwest::Client,
}

impl ReqwestRoundTripper {
    /// Create a client whose whole exchange is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hooktest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RoundTripper for ReqwestRoundTripper {
    async fn round_trip(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let mut builder = self.client.request(request.method.to_reqwest(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().await.map_err(|e| TransportError::Send {
            method: request.method,
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| TransportError::ReadBody {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(status, bytes = body.len(), "Received response");

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
