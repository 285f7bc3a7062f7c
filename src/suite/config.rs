//! Suite document types
//!
//! Defines the data structures for deserializing JSON or YAML suites, plus
//! the environment overrides and validation applied before anything touches
//! the network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use axum::http::HeaderName;
use serde::Deserialize;
use serde_json::Value;

use crate::callback::{Algorithm, AuthConfig, SignatureConfig, TlsFiles, DEFAULT_ID_FIELD};
use crate::cleanup::CleanupConfig;
use crate::common::{Error, Result};
use crate::executor::{step_label, StepKind};
use crate::http::HttpMethod;

/// A complete suite loaded from a JSON or YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct Suite {
    /// Name of the suite; defaults to the file stem
    #[serde(default)]
    pub name: String,
    /// Prefix for every step endpoint
    #[serde(default)]
    pub base_url: String,
    /// Callback listener settings, needed once any step expects callbacks
    #[serde(default)]
    pub callback: Option<CallbackConfig>,
    /// State reset between steps
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Named fixture routines referenced from test cases
    #[serde(default)]
    pub setup_routines: BTreeMap<String, Vec<TestStep>>,
    /// Steps under test, in execution order
    #[serde(default)]
    pub test_cases: Vec<TestStep>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CallbackConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub route: String,
    /// Total wait for a step's callbacks; 0 uses the configured default
    #[serde(default)]
    pub max_wait_seconds: u64,
    /// Object path receiving the correlation id; empty means the body root
    #[serde(default)]
    pub id_location: String,
    /// Body field holding the correlation id
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub signature: Option<SignatureConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Serve callbacks over HTTPS
    #[serde(default)]
    pub ssl: bool,
    /// PEM certificate chain, relative to the suite file
    #[serde(default)]
    pub ssl_cert_file: Option<PathBuf>,
    /// PEM private key, relative to the suite file
    #[serde(default)]
    pub ssl_key_file: Option<PathBuf>,
}

impl CallbackConfig {
    /// Certificate and key to serve with, resolved against `base_dir`
    ///
    /// `None` unless `ssl` is on and both files are named.
    pub fn tls_files(&self, base_dir: &Path) -> Option<TlsFiles> {
        if !self.ssl {
            return None;
        }
        let cert = self.ssl_cert_file.as_ref()?;
        let key = self.ssl_key_file.as_ref()?;
        Some(TlsFiles {
            cert_file: base_dir.join(cert),
            key_file: base_dir.join(key),
        })
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// A single request/response exchange, used for both setup steps and test cases
#[derive(Deserialize, Debug, Clone)]
pub struct TestStep {
    pub name: String,
    pub http_method: HttpMethod,
    pub endpoint: String,
    pub status_code: u16,
    #[serde(default)]
    pub request_body: Option<Value>,
    /// Whether a non-empty response body is required
    #[serde(default)]
    pub response_body: bool,
    /// Variable name to dotted response path
    #[serde(default)]
    pub store_response_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub callback: CallbackExpectation,
    /// Setup routines to run first, by name
    #[serde(default)]
    pub setup: Vec<String>,
    /// 1-based position within its list
    #[serde(skip)]
    pub ordinal: usize,
}

/// Callbacks a test case expects after its request
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackExpectation {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub times: u32,
}

impl Suite {
    /// Load a suite, choosing the decoder by file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut suite = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .map_err(|message| Error::SuiteParse {
            path: path.display().to_string(),
            message,
        })?;

        if suite.name.is_empty() {
            suite.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "suite".to_string());
        }
        Ok(suite)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        let suite: Suite = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        Ok(suite.numbered())
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        let suite: Suite = serde_json::from_str(content).map_err(|e| e.to_string())?;
        Ok(suite.numbered())
    }

    fn numbered(mut self) -> Self {
        for (i, step) in self.test_cases.iter_mut().enumerate() {
            step.ordinal = i + 1;
        }
        for steps in self.setup_routines.values_mut() {
            for (i, step) in steps.iter_mut().enumerate() {
                step.ordinal = i + 1;
            }
        }
        self
    }

    /// Apply `HOOKTEST_*` overrides; empty values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(base_url) = get("HOOKTEST_BASE_URL") {
            self.base_url = base_url;
        }

        let port = get("HOOKTEST_CALLBACK_PORT");
        let secret = get("HOOKTEST_SIGNATURE_SECRET");
        let header = get("HOOKTEST_SIGNATURE_HEADER");
        let hash = get("HOOKTEST_SIGNATURE_HASH");
        let replay = get("HOOKTEST_REPLAY_ATTACKS");
        let ssl = get("HOOKTEST_SSL");
        let cert_file = get("HOOKTEST_SSL_CERT_FILE");
        let key_file = get("HOOKTEST_SSL_KEY_FILE");

        let Some(callback) = self.callback.as_mut() else {
            let any = [&port, &secret, &header, &hash, &replay, &ssl, &cert_file, &key_file]
                .iter()
                .any(|value| value.is_some());
            if any {
                tracing::warn!("Ignoring callback overrides: suite has no callback section");
            }
            return Ok(());
        };

        if let Some(port) = port {
            callback.port = port
                .parse()
                .map_err(|_| Error::invalid_suite(format!("HOOKTEST_CALLBACK_PORT '{}' is not a port", port)))?;
        }

        if let Some(ssl) = ssl {
            callback.ssl = parse_bool(&ssl)
                .ok_or_else(|| Error::invalid_suite(format!("HOOKTEST_SSL '{}' is not a boolean", ssl)))?;
        }
        if let Some(cert_file) = cert_file {
            callback.ssl_cert_file = Some(PathBuf::from(cert_file));
        }
        if let Some(key_file) = key_file {
            callback.ssl_key_file = Some(PathBuf::from(key_file));
        }

        if secret.is_some() || header.is_some() || hash.is_some() || replay.is_some() {
            let signature = callback.signature.get_or_insert_with(SignatureConfig::default);
            if let Some(secret) = secret {
                signature.secret = secret;
            }
            if let Some(header) = header {
                signature.header = header;
            }
            if let Some(hash) = hash {
                signature.hash = hash;
            }
            if let Some(replay) = replay {
                signature.replay_attacks = parse_bool(&replay).ok_or_else(|| {
                    Error::invalid_suite(format!("HOOKTEST_REPLAY_ATTACKS '{}' is not a boolean", replay))
                })?;
            }
        }
        Ok(())
    }

    /// True when some test case expects callbacks
    pub fn needs_callback_listener(&self) -> bool {
        self.test_cases.iter().any(|step| step.callback.enabled)
    }

    /// Check the suite is runnable; run before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::invalid_suite("base_url is required"));
        }
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) if url.has_host() => {}
            Ok(_) => {
                return Err(Error::invalid_suite(format!("base_url '{}' has no host", self.base_url)));
            }
            Err(e) => {
                return Err(Error::invalid_suite(format!("base_url '{}' is invalid: {}", self.base_url, e)));
            }
        }

        if let Some(callback) = &self.callback {
            validate_callback(callback)?;
        }

        for (routine, steps) in &self.setup_routines {
            if steps.is_empty() {
                return Err(Error::invalid_suite(format!("setup routine '{}' has no steps", routine)));
            }
            for step in steps {
                let label = step_label(StepKind::Setup, step.ordinal, &step.name);
                validate_step(step, &label)?;
                if !step.store_response_variables.is_empty() && !step.response_body {
                    return Err(Error::invalid_suite(format!(
                        "{}: store_response_variables requires response_body: true",
                        label
                    )));
                }
                if step.callback.enabled {
                    return Err(Error::invalid_suite(format!("{}: setup steps cannot expect callbacks", label)));
                }
                if !step.setup.is_empty() {
                    return Err(Error::invalid_suite(format!("{}: setup steps cannot reference setup routines", label)));
                }
            }
        }

        for step in &self.test_cases {
            let label = step_label(StepKind::Test, step.ordinal, &step.name);
            validate_step(step, &label)?;

            if !step.store_response_variables.is_empty() {
                return Err(Error::invalid_suite(format!(
                    "{}: store_response_variables is only allowed on setup steps",
                    label
                )));
            }
            if step.callback.enabled {
                if step.callback.times == 0 {
                    return Err(Error::invalid_suite(format!("{}: callback enabled but times is 0", label)));
                }
                if self.callback.is_none() {
                    return Err(Error::invalid_suite(format!(
                        "{}: expects callbacks but the suite has no callback section",
                        label
                    )));
                }
            }
            for routine in &step.setup {
                if !self.setup_routines.contains_key(routine) {
                    return Err(Error::UnknownSetupRoutine {
                        routine: routine.clone(),
                        step: step.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_step(step: &TestStep, label: &str) -> Result<()> {
    if step.name.trim().is_empty() {
        return Err(Error::invalid_suite(format!("{}: name is required", label)));
    }
    if step.endpoint.is_empty() {
        return Err(Error::invalid_suite(format!("{}: endpoint is required", label)));
    }
    if !step.endpoint.starts_with('/') {
        return Err(Error::invalid_suite(format!(
            "{}: endpoint '{}' must start with '/'",
            label, step.endpoint
        )));
    }
    if !(100..=599).contains(&step.status_code) {
        return Err(Error::invalid_suite(format!(
            "{}: status_code {} is not a valid HTTP status",
            label, step.status_code
        )));
    }
    Ok(())
}

fn validate_callback(callback: &CallbackConfig) -> Result<()> {
    if !callback.route.starts_with('/') {
        return Err(Error::invalid_suite(format!(
            "callback route '{}' must start with '/'",
            callback.route
        )));
    }
    // The listener registers the route verbatim, so no path parameters
    if callback.route.contains([':', '*', '{', '}']) {
        return Err(Error::invalid_suite(format!(
            "callback route '{}' must be a literal path",
            callback.route
        )));
    }

    if callback.id_field.is_empty() {
        return Err(Error::invalid_suite("callback id_field must not be empty"));
    }
    // Injection treats the field as one path segment
    if callback.id_field.contains(['.', '[', ']']) {
        return Err(Error::invalid_suite(format!(
            "callback id_field '{}' must be a plain field name",
            callback.id_field
        )));
    }

    if callback.ssl && (callback.ssl_cert_file.is_none() || callback.ssl_key_file.is_none()) {
        return Err(Error::invalid_suite(
            "callback ssl is enabled: both cert_file and key_file are required",
        ));
    }

    if let Some(signature) = &callback.signature {
        if signature.secret.is_empty() {
            return Err(Error::invalid_suite("callback signature secret is required"));
        }
        if HeaderName::from_bytes(signature.header.as_bytes()).is_err() {
            return Err(Error::invalid_suite(format!(
                "callback signature header '{}' is not a valid header name",
                signature.header
            )));
        }
        signature.hash.parse::<Algorithm>().map_err(Error::SignatureConfig)?;
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SUITE: &str = r#"
base_url: http://localhost:8080
callback:
  port: 9000
  route: /callback
  id_location: data
  signature:
    secret: s3cr3t
    header: X-Signature
    hash: SHA256
setup_routines:
  create_user:
    - name: create user
      http_method: POST
      endpoint: /create_user
      status_code: 200
      response_body: true
      store_response_variables: { user_id: user_id }
test_cases:
  - name: fetch user
    setup: [create_user]
    http_method: GET
    endpoint: /users/{user_id}
    status_code: 200
    response_body: true
  - name: fire event
    http_method: POST
    endpoint: /events
    status_code: 202
    request_body: { data: { kind: created } }
    callback: { enabled: true, times: 2 }
"#;

    fn suite() -> Suite {
        Suite::from_yaml(SUITE).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_yaml_suite() {
        let suite = suite();
        assert_eq!(suite.base_url, "http://localhost:8080");
        assert_eq!(suite.test_cases.len(), 2);
        assert_eq!(suite.test_cases[1].ordinal, 2);
        assert_eq!(suite.test_cases[1].callback, CallbackExpectation { enabled: true, times: 2 });
        assert_eq!(suite.setup_routines["create_user"][0].ordinal, 1);

        let callback = suite.callback.as_ref().unwrap();
        assert_eq!(callback.host, "0.0.0.0");
        assert_eq!(callback.id_field, "callback_id");
        assert!(!callback.ssl);
        assert_eq!(callback.max_wait_seconds, 0);
        assert_eq!(callback.auth, AuthConfig::None);
        assert_eq!(suite.cleanup, CleanupConfig::None);
        assert!(suite.needs_callback_listener());
        suite.validate().unwrap();
    }

    #[test]
    fn test_load_json_defaults_name_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke.json");
        std::fs::write(
            &path,
            r#"{"base_url":"http://localhost:1","test_cases":[{"name":"ping","http_method":"GET","endpoint":"/ping","status_code":204}]}"#,
        )
        .unwrap();

        let suite = Suite::load(&path).unwrap();
        assert_eq!(suite.name, "smoke");
        assert!(!suite.needs_callback_listener());
        suite.validate().unwrap();
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "test_cases: [{ name: x, http_method: FETCH }]").unwrap();
        let err = Suite::load(&path).unwrap_err();
        assert!(matches!(err, Error::SuiteParse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_overrides() {
        let mut suite = suite();
        suite
            .apply_overrides(env(&[
                ("HOOKTEST_BASE_URL", "http://api.internal:9999"),
                ("HOOKTEST_CALLBACK_PORT", "9100"),
                ("HOOKTEST_SIGNATURE_HASH", "SHA512"),
                ("HOOKTEST_SIGNATURE_SECRET", ""),
                ("HOOKTEST_REPLAY_ATTACKS", "true"),
            ]))
            .unwrap();

        assert_eq!(suite.base_url, "http://api.internal:9999");
        let callback = suite.callback.unwrap();
        assert_eq!(callback.port, 9100);
        let signature = callback.signature.unwrap();
        assert_eq!(signature.hash, "SHA512");
        assert_eq!(signature.secret, "s3cr3t");
        assert!(signature.replay_attacks);
    }

    #[test]
    fn test_tls_overrides() {
        let mut suite = suite();
        suite
            .apply_overrides(env(&[
                ("HOOKTEST_SSL", "yes"),
                ("HOOKTEST_SSL_CERT_FILE", "certs/server.crt"),
                ("HOOKTEST_SSL_KEY_FILE", "certs/server.key"),
            ]))
            .unwrap();

        let callback = suite.callback.as_ref().unwrap();
        assert!(callback.ssl);
        assert_eq!(callback.ssl_cert_file, Some(PathBuf::from("certs/server.crt")));
        assert_eq!(callback.ssl_key_file, Some(PathBuf::from("certs/server.key")));
        suite.validate().unwrap();

        let err = suite.apply_overrides(env(&[("HOOKTEST_SSL", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("HOOKTEST_SSL 'maybe'"), "{}", err);
    }

    #[test]
    fn test_bad_port_override_is_rejected() {
        let mut suite = suite();
        let err = suite
            .apply_overrides(env(&[("HOOKTEST_CALLBACK_PORT", "ninety")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSuite(_)));
    }

    fn assert_rejected(mutate: impl FnOnce(&mut Suite), needle: &str) {
        let mut suite = suite();
        mutate(&mut suite);
        let err = suite.validate().unwrap_err().to_string();
        assert!(err.contains(needle), "'{}' should contain '{}'", err, needle);
    }

    #[test]
    fn test_validation_failures() {
        assert_rejected(|s| s.base_url.clear(), "base_url is required");
        assert_rejected(|s| s.base_url = "not a url".into(), "is invalid");
        assert_rejected(|s| s.test_cases[0].name = " ".into(), "name is required");
        assert_rejected(|s| s.test_cases[0].endpoint = "users".into(), "must start with '/'");
        assert_rejected(|s| s.test_cases[0].status_code = 99, "not a valid HTTP status");
        assert_rejected(|s| s.test_cases[1].callback.times = 0, "times is 0");
        assert_rejected(
            |s| s.callback.as_mut().unwrap().route = "callback".into(),
            "must start with '/'",
        );
        assert_rejected(
            |s| s.callback.as_mut().unwrap().route = "/cb/{id}".into(),
            "literal path",
        );
        assert_rejected(
            |s| {
                s.test_cases[0]
                    .store_response_variables
                    .insert("x".into(), "x".into());
            },
            "only allowed on setup steps",
        );
        assert_rejected(
            |s| s.callback.as_mut().unwrap().ssl = true,
            "both cert_file and key_file are required",
        );
        assert_rejected(
            |s| {
                let callback = s.callback.as_mut().unwrap();
                callback.ssl = true;
                callback.ssl_cert_file = Some(PathBuf::from("server.crt"));
            },
            "both cert_file and key_file are required",
        );
        assert_rejected(|s| s.callback.as_mut().unwrap().id_field.clear(), "id_field must not be empty");
        assert_rejected(
            |s| s.callback.as_mut().unwrap().id_field = "meta.id".into(),
            "must be a plain field name",
        );
    }

    #[test]
    fn test_setup_capture_requires_response_body() {
        let mut suite = suite();
        suite.setup_routines.get_mut("create_user").unwrap()[0].response_body = false;
        let err = suite.validate().unwrap_err().to_string();
        assert!(err.contains("setup_step 1 'create user'"), "{}", err);
        assert!(err.contains("store_response_variables requires response_body: true"), "{}", err);

        // A bodyless setup step without captures is fine
        let routine = suite.setup_routines.get_mut("create_user").unwrap();
        routine[0].store_response_variables.clear();
        suite.validate().unwrap();
    }

    #[test]
    fn test_parse_tls_and_id_field() {
        let yaml = SUITE.replace(
            "  id_location: data\n",
            "  id_location: data\n  id_field: immune_callback_id\n  ssl: true\n  ssl_cert_file: tls/cert.pem\n  ssl_key_file: tls/key.pem\n",
        );
        let suite = Suite::from_yaml(&yaml).unwrap();
        let callback = suite.callback.as_ref().unwrap();
        assert_eq!(callback.id_field, "immune_callback_id");
        assert!(callback.ssl);
        assert_eq!(callback.ssl_key_file, Some(PathBuf::from("tls/key.pem")));
        suite.validate().unwrap();
    }

    #[test]
    fn test_callbacks_without_section_is_rejected() {
        let mut suite = suite();
        suite.callback = None;
        let err = suite.validate().unwrap_err().to_string();
        assert!(err.contains("test_case 2 'fire event'"), "{}", err);
        assert!(err.contains("no callback section"), "{}", err);
    }

    #[test]
    fn test_unknown_setup_routine() {
        let mut suite = suite();
        suite.test_cases[0].setup = vec!["missing".to_string()];
        let err = suite.validate().unwrap_err();
        assert!(matches!(err, Error::UnknownSetupRoutine { ref routine, .. } if routine == "missing"));
    }

    #[test]
    fn test_unknown_algorithm_is_config_error() {
        let mut suite = suite();
        suite.callback.as_mut().unwrap().signature.as_mut().unwrap().hash = "CRC32".into();
        assert!(matches!(suite.validate().unwrap_err(), Error::SignatureConfig(_)));
    }

    #[test]
    fn test_tls_files_resolve_against_suite_dir() {
        let mut callback = suite().callback.unwrap();
        callback.ssl_cert_file = Some(PathBuf::from("tls/cert.pem"));
        callback.ssl_key_file = Some(PathBuf::from("/etc/hooktest/key.pem"));
        assert_eq!(callback.tls_files(Path::new("suites")), None);

        callback.ssl = true;
        assert_eq!(
            callback.tls_files(Path::new("suites")),
            Some(TlsFiles {
                cert_file: PathBuf::from("suites/tls/cert.pem"),
                key_file: PathBuf::from("/etc/hooktest/key.pem"),
            })
        );
    }
}
