//! State cleanup between test steps
//!
//! A suite names a cleanup backend; it runs once before the first step and
//! again after every test step that passes, so each step starts from the
//! same fixture state.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;

#[async_trait]
pub trait Truncator: Send + Sync {
    async fn truncate(&self) -> Result<(), String>;
}

pub struct NoopTruncator;

#[async_trait]
impl Truncator for NoopTruncator {
    async fn truncate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Runs a shell command, from the suite's directory
pub struct ShellTruncator {
    command: String,
    working_dir: PathBuf,
}

impl ShellTruncator {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl Truncator for ShellTruncator {
    async fn truncate(&self) -> Result<(), String> {
        tracing::debug!(command = %self.command, "Running cleanup command");

        let output = TokioCommand::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("cleanup command '{}' failed to execute: {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "cleanup command '{}' failed with exit code {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CleanupConfig {
    #[default]
    None,
    Shell {
        command: String,
    },
}

impl CleanupConfig {
    /// Build the backend; relative commands resolve against `base_dir`
    pub fn build(&self, base_dir: &Path) -> Arc<dyn Truncator> {
        match self {
            CleanupConfig::None => Arc::new(NoopTruncator),
            CleanupConfig::Shell { command } => Arc::new(ShellTruncator::new(command, base_dir)),
        }
    }
}
