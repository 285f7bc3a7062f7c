//! Inbound callback authentication

use std::sync::Arc;

use axum::http::HeaderMap;
use serde::Deserialize;

/// Decides whether an inbound callback request may be accepted
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> bool;
}

/// Accepts every request
pub struct NoopAuthenticator;

impl Authenticator for NoopAuthenticator {
    fn authenticate(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires a fixed header to carry a fixed value
pub struct ApiKeyAuthenticator {
    header_name: String,
    header_value: String,
}

impl ApiKeyAuthenticator {
    pub fn new(header_name: impl Into<String>, header_value: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            header_value: header_value.into(),
        }
    }
}

impl Authenticator for ApiKeyAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> bool {
        headers
            .get(self.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.header_value)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    ApiKey {
        header_name: String,
        header_value: String,
    },
}

impl AuthConfig {
    pub fn build(&self) -> Arc<dyn Authenticator> {
        match self {
            AuthConfig::None => Arc::new(NoopAuthenticator),
            AuthConfig::ApiKey {
                header_name,
                header_value,
            } => Arc::new(ApiKeyAuthenticator::new(header_name, header_value)),
        }
    }
}
