//! Inbound callback signals

use axum::body::Bytes;
use axum::http::HeaderMap;
use serde_json::Value;

/// Default body field carrying the correlation id, both when injected into
/// an outbound request and when read back from a callback
pub const DEFAULT_ID_FIELD: &str = "callback_id";

/// A single received callback
///
/// A body that cannot be decoded still yields a `Signal`, with `error` set,
/// so the step waiting for it fails on the callback instead of timing out.
#[derive(Debug, Clone)]
pub struct Signal {
    pub callback_id: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub error: Option<String>,
}

impl Signal {
    /// Decode `body`, reading the correlation id from the top-level `id_field`
    pub fn decode(headers: HeaderMap, body: Bytes, id_field: &str) -> Self {
        let (callback_id, error) = match extract_callback_id(&body, id_field) {
            Ok(id) => (id, None),
            Err(e) => (String::new(), Some(e)),
        };
        Self {
            callback_id,
            headers,
            body,
            error,
        }
    }

    /// Header value as text; missing and non-text headers are both `None`
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

fn extract_callback_id(body: &[u8], id_field: &str) -> Result<String, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("failed to decode callback body: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "callback body is not a JSON object".to_string())?;
    match object.get(id_field) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(_) => Err(format!("callback field '{}' is not a string", id_field)),
        None => Err(format!("callback body has no '{}' field", id_field)),
    }
}
