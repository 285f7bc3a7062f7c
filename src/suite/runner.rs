//! Suite runner implementation
//!
//! Loads a suite, wires the executor to its collaborators and runs test
//! cases in order, halting at the first failure.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::callback::{CallbackListener, ListenerOptions, SignatureVerifier};
use crate::cleanup::Truncator;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::executor::{step_label, CallbackSettings, Executor, IdGenerator, StepKind, UuidIds};
use crate::http::{ReqwestRoundTripper, RoundTripper};
use crate::value::VariableStore;

use super::config::Suite;
use super::report::{StepOutcome, SuiteReport};

/// Load, override, validate and run the suite at `path`
pub async fn run_suite(path: &Path, config: &Config, verbose: bool) -> Result<SuiteReport> {
    let mut suite = Suite::load(path)?;
    suite.apply_overrides(|key| std::env::var(key).ok())?;

    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    SuiteRunner::new(suite, config.clone())
        .with_base_dir(base_dir)
        .verbose(verbose)
        .run()
        .await
}

pub struct SuiteRunner {
    suite: Suite,
    config: Config,
    base_dir: PathBuf,
    http: Option<Arc<dyn RoundTripper>>,
    ids: Arc<dyn IdGenerator>,
    verbose: bool,
}

impl SuiteRunner {
    pub fn new(suite: Suite, config: Config) -> Self {
        Self {
            suite,
            config,
            base_dir: PathBuf::from("."),
            http: None,
            ids: Arc::new(UuidIds),
            verbose: false,
        }
    }

    pub fn with_round_tripper(mut self, http: Arc<dyn RoundTripper>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Directory cleanup commands run from and TLS files resolve against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub async fn run(self) -> Result<SuiteReport> {
        self.suite.validate()?;

        // Signature settings fail here, before any network activity
        let verifier = self
            .suite
            .callback
            .as_ref()
            .and_then(|c| c.signature.as_ref())
            .map(SignatureVerifier::new)
            .transpose()
            .map_err(Error::SignatureConfig)?;

        let http: Arc<dyn RoundTripper> = match &self.http {
            Some(http) => http.clone(),
            None => Arc::new(ReqwestRoundTripper::new(Duration::from_secs(
                self.config.http.request_timeout_secs,
            ))?),
        };
        let truncator = self.suite.cleanup.build(&self.base_dir);

        println!(
            "\n{} {}",
            "Running Suite:".blue().bold(),
            self.suite.name.white().bold()
        );
        if self.verbose {
            println!("  Base URL: {}", self.suite.base_url.dimmed());
        }

        let mut executor = Executor::new(self.suite.base_url.clone(), http)
            .with_truncator(truncator.clone())
            .with_ids(self.ids.clone());

        let mut listener = None;
        let wants_listener = self.suite.needs_callback_listener();
        if let Some(callback) = self.suite.callback.as_ref().filter(|_| wants_listener) {
            let started = CallbackListener::start(
                ListenerOptions {
                    host: callback.host.clone(),
                    port: callback.port,
                    route: callback.route.clone(),
                    id_field: callback.id_field.clone(),
                    shutdown_timeout: Duration::from_secs(self.config.callback.shutdown_timeout_secs),
                    tls: callback.tls_files(&self.base_dir),
                },
                callback.auth.build(),
            )
            .await?;

            let max_wait = if callback.max_wait_seconds == 0 {
                tracing::warn!(
                    "max_wait_seconds not set, waiting up to {}s for callbacks",
                    self.config.callback.default_max_wait_secs
                );
                self.config.callback.default_max_wait_secs
            } else {
                callback.max_wait_seconds
            };

            if self.verbose {
                let scheme = if callback.ssl { "https" } else { "http" };
                println!(
                    "  Callbacks: {}",
                    format!("{}://{}{}", scheme, started.local_addr(), callback.route).dimmed()
                );
            }

            executor = executor.with_callbacks(CallbackSettings {
                source: started.source(),
                id_location: callback.id_location.clone(),
                id_field: callback.id_field.clone(),
                max_wait: Duration::from_secs(max_wait),
                verifier,
            });
            listener = Some(started);
        }

        let report = self.run_steps(&executor, truncator.as_ref()).await;

        // A listener that will not drain outranks the step outcome
        if let Some(listener) = listener {
            listener.stop().await?;
        }

        if report.passed {
            println!("\n{} {}\n", "✓".green().bold(), "Suite Passed".green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), "Suite Failed".red().bold());
        }
        tracing::info!(
            suite = %report.name,
            passed = report.passed,
            steps_run = report.steps_run,
            "Suite finished"
        );
        Ok(report)
    }

    async fn run_steps(&self, executor: &Executor, truncator: &dyn Truncator) -> SuiteReport {
        let mut report = SuiteReport::new(&self.suite.name, self.suite.test_cases.len());

        if let Err(e) = truncator.truncate().await {
            let error = Error::Cleanup(e).to_string();
            println!("  {} {}", "✗".red(), error);
            report.fail(error);
            return report;
        }

        println!("\n{}", "Steps:".cyan());

        let mut store = VariableStore::new();
        let mut routines_run: HashSet<&str> = HashSet::new();

        for step in &self.suite.test_cases {
            report.steps_run += 1;

            for routine in &step.setup {
                if routines_run.contains(routine.as_str()) {
                    continue;
                }
                // Validation guarantees the name exists
                let Some(setup_steps) = self.suite.setup_routines.get(routine) else {
                    let error = Error::UnknownSetupRoutine {
                        routine: routine.clone(),
                        step: step.name.clone(),
                    };
                    report.fail(error.to_string());
                    return report;
                };

                if self.verbose {
                    println!("  {} {}", "Setup:".cyan(), routine);
                }
                for setup_step in setup_steps {
                    let label = step_label(StepKind::Setup, setup_step.ordinal, &setup_step.name);
                    let started = Instant::now();
                    let result = executor.execute_setup(setup_step, &mut store).await;
                    if !self.record(&mut report, StepKind::Setup, label, started, result) {
                        return report;
                    }
                }
                routines_run.insert(routine.as_str());
            }

            let label = step_label(StepKind::Test, step.ordinal, &step.name);
            let started = Instant::now();
            let result = executor.execute_test(step, &mut store).await;
            if !self.record(&mut report, StepKind::Test, label, started, result) {
                return report;
            }
        }

        report
    }

    /// Print and record one step; false when the suite must halt
    fn record(
        &self,
        report: &mut SuiteReport,
        kind: StepKind,
        label: String,
        started: Instant,
        result: Result<()>,
    ) -> bool {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                println!(
                    "  {} {} {}",
                    "✓".green(),
                    label,
                    format!("({} ms)", elapsed_ms).dimmed()
                );
                report.steps.push(StepOutcome::passed(kind, label, elapsed_ms));
                true
            }
            Err(e) => {
                let message = e.to_string();
                println!("  {} {}", "✗".red(), message);
                report.steps.push(StepOutcome::failed(kind, label, elapsed_ms, message.clone()));
                report.fail(message);
                false
            }
        }
    }
}
