//! Suite results

use std::path::Path;

use serde::Serialize;

use crate::common::Result;
use crate::executor::StepKind;

/// Result of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub passed: bool,
    /// Test cases started, including the one that failed
    pub steps_run: usize,
    pub steps_total: usize,
    /// Every setup step and test case that ran, in order
    pub steps: Vec<StepOutcome>,
    /// First failure, if any
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub kind: String,
    pub label: String,
    pub passed: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn passed(kind: StepKind, label: String, elapsed_ms: u64) -> Self {
        Self {
            kind: kind.to_string(),
            label,
            passed: true,
            elapsed_ms,
            error: None,
        }
    }

    pub fn failed(kind: StepKind, label: String, elapsed_ms: u64, error: String) -> Self {
        Self {
            kind: kind.to_string(),
            label,
            passed: false,
            elapsed_ms,
            error: Some(error),
        }
    }
}

impl SuiteReport {
    pub fn new(name: &str, steps_total: usize) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            steps_run: 0,
            steps_total,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Mark the run failed; only the first error is kept
    pub fn fail(&mut self, error: String) {
        self.passed = false;
        self.error.get_or_insert(error);
    }
}

/// Write the report as pretty JSON
pub fn write_report(path: &Path, report: &SuiteReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "Wrote suite report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let mut report = SuiteReport::new("s", 2);
        report.fail("first".to_string());
        report.fail("second".to_string());
        assert!(!report.passed);
        assert_eq!(report.error.as_deref(), Some("first"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = SuiteReport::new("users", 1);
        report.steps_run = 1;
        report
            .steps
            .push(StepOutcome::passed(StepKind::Test, "test_case 1 'x'".to_string(), 12));
        write_report(&path, &report).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["name"], "users");
        assert_eq!(written["passed"], true);
        assert_eq!(written["steps"][0]["kind"], "test_case");
        assert_eq!(written["steps"][0]["elapsed_ms"], 12);
        assert!(written["steps"][0].get("error").is_none());
    }
}
