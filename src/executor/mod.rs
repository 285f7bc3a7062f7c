//! Step execution
//!
//! Drives one step through render, send, assert, capture and, for test
//! cases expecting them, callback collection. The first failure ends the
//! step and comes back wrapped with the step's identity.

pub mod ids;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::callback::{CallbackSource, ReceiveError, SignatureVerifier};
use crate::cleanup::{NoopTruncator, Truncator};
use crate::common::{Error, Result, StepError};
use crate::http::{HttpRequest, RoundTripper};
use crate::suite::config::TestStep;
use crate::template::{self, UrlTemplate};
use crate::value::{self, PathError, VariableStore};

pub use ids::{IdGenerator, SequentialIds, UuidIds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Setup,
    Test,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Setup => f.write_str("setup_step"),
            StepKind::Test => f.write_str("test_case"),
        }
    }
}

/// Identity used in every error and progress line for a step
pub fn step_label(kind: StepKind, ordinal: usize, name: &str) -> String {
    format!("{} {} '{}'", kind, ordinal, name)
}

/// Everything needed to collect a test case's callbacks
pub struct CallbackSettings {
    pub source: Arc<dyn CallbackSource>,
    pub id_location: String,
    /// Body field holding the correlation id, outbound and inbound
    pub id_field: String,
    pub max_wait: Duration,
    pub verifier: Option<SignatureVerifier>,
}

pub struct Executor {
    base_url: String,
    http: Arc<dyn RoundTripper>,
    callbacks: Option<CallbackSettings>,
    truncator: Arc<dyn Truncator>,
    ids: Arc<dyn IdGenerator>,
}

impl Executor {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn RoundTripper>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            callbacks: None,
            truncator: Arc::new(NoopTruncator),
            ids: Arc::new(UuidIds),
        }
    }

    pub fn with_callbacks(mut self, callbacks: CallbackSettings) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn with_truncator(mut self, truncator: Arc<dyn Truncator>) -> Self {
        self.truncator = truncator;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Run a setup step, storing its declared response variables
    pub async fn execute_setup(&self, step: &TestStep, store: &mut VariableStore) -> Result<()> {
        let label = step_label(StepKind::Setup, step.ordinal, &step.name);
        tracing::info!("Running {}", label);

        let body = self
            .exchange(step, None, store)
            .await
            .map_err(|e| Error::step_failed(&label, e))?;

        if let Some(body) = body {
            store
                .capture(&step.store_response_variables, &body)
                .map_err(|e| Error::step_failed(&label, StepError::Capture(e)))?;
        }
        Ok(())
    }

    /// Run a test case, wait for its callbacks, then clean up
    pub async fn execute_test(&self, step: &TestStep, store: &mut VariableStore) -> Result<()> {
        let label = step_label(StepKind::Test, step.ordinal, &step.name);
        tracing::info!("Running {}", label);

        self.run_test(step, store)
            .await
            .map_err(|e| Error::step_failed(&label, e))
    }

    async fn run_test(&self, step: &TestStep, store: &VariableStore) -> std::result::Result<(), StepError> {
        let expectation = step.callback.enabled.then_some(step.callback.times);

        let (callbacks, callback_id) = match expectation {
            Some(_) => {
                let callbacks = self.callbacks.as_ref().ok_or(StepError::NoCallbackListener)?;
                (Some(callbacks), Some(self.ids.next_id()))
            }
            None => (None, None),
        };

        let injection = callbacks.zip(callback_id.as_deref());
        self.exchange(step, injection, store).await?;

        if let (Some(settings), Some(id), Some(times)) = (callbacks, callback_id.as_deref(), expectation) {
            await_callbacks(settings, id, times).await?;
        }

        self.truncator.truncate().await.map_err(StepError::Cleanup)
    }

    /// Steps 1 through 6: render, send, assert and decode
    async fn exchange(
        &self,
        step: &TestStep,
        injection: Option<(&CallbackSettings, &str)>,
        store: &VariableStore,
    ) -> std::result::Result<Option<Value>, StepError> {
        let endpoint = UrlTemplate::parse(&step.endpoint)
            .and_then(|t| t.render(store))
            .map_err(StepError::UrlTemplate)?;
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);

        let mut body = step.request_body.clone();
        if let Some((settings, id)) = injection {
            let tree = body.get_or_insert_with(|| Value::Object(Map::new()));
            inject_callback_id(tree, &settings.id_location, &settings.id_field, id)
                .map_err(StepError::CallbackInjection)?;
        }

        let body = body
            .map(|tree| template::substitute(tree, store))
            .transpose()
            .map_err(StepError::BodyTemplate)?;

        let response = self
            .http
            .round_trip(HttpRequest {
                method: step.http_method,
                url,
                body,
            })
            .await
            .map_err(StepError::Transport)?;

        if response.status != step.status_code {
            return Err(StepError::StatusMismatch {
                expected: step.status_code,
                actual: response.status,
                body: response.body_text(),
            });
        }

        if !step.response_body {
            if response.has_body() {
                return Err(StepError::UnexpectedResponseBody {
                    body: response.body_text(),
                });
            }
            return Ok(None);
        }

        if !response.has_body() {
            return Err(StepError::MissingResponseBody);
        }
        let decoded = serde_json::from_slice(&response.body).map_err(|e| StepError::ResponseDecode {
            message: e.to_string(),
            body: response.body_text(),
        })?;
        Ok(Some(decoded))
    }
}

/// Write `id` under `id_field` in the object at `id_location`
///
/// An empty location means the body root.
pub fn inject_callback_id(
    body: &mut Value,
    id_location: &str,
    id_field: &str,
    id: &str,
) -> std::result::Result<(), PathError> {
    let path = if id_location.is_empty() {
        id_field.to_string()
    } else {
        format!("{}.{}", id_location, id_field)
    };
    value::write(body, &path, Value::String(id.to_string()))
}

/// Collect `times` callbacks carrying `expected_id` before one shared deadline
async fn await_callbacks(
    settings: &CallbackSettings,
    expected_id: &str,
    times: u32,
) -> std::result::Result<(), StepError> {
    let deadline = Instant::now() + settings.max_wait;

    for received in 0..times {
        let signal = match settings.source.receive(deadline).await {
            Ok(signal) => signal,
            Err(ReceiveError::DeadlineExceeded) => {
                return Err(StepError::CallbackTimeout {
                    expected: times,
                    received,
                    waited_secs: settings.max_wait.as_secs(),
                });
            }
            Err(ReceiveError::Closed) => {
                return Err(StepError::ListenerClosed {
                    expected: times,
                    received,
                });
            }
        };

        if let Some(error) = signal.error.clone() {
            return Err(StepError::CallbackDecode(error));
        }
        if signal.callback_id != expected_id {
            return Err(StepError::CallbackMismatch {
                expected: expected_id.to_string(),
                actual: signal.callback_id,
            });
        }
        if let Some(verifier) = &settings.verifier {
            verifier.verify(&signal).map_err(StepError::Signature)?;
        }

        tracing::info!("Callback {} of {} received", received + 1, times);
    }
    Ok(())
}
