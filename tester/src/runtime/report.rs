//! Suite Reports
//!
//! Combines the test verdict with the way the cluster went down.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use orchestrator::{ShutdownReport, TestRunSummary};

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Endpoint the test binary was pointed at
    pub endpoint: String,
    pub run_root: PathBuf,
    pub summary: TestRunSummary,
    pub shutdown: ShutdownReport,
    /// Whether the run directory was left on disk
    pub kept_data: bool,
    pub finished_at: DateTime<Utc>,
}

impl SuiteReport {
    /// Tests passed and the cluster went down cleanly
    pub fn passed(&self) -> bool {
        self.summary.overall && !self.shutdown.error
    }

    /// Human readable per-test listing
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in self.summary.per_test.values() {
            let verdict = if result.status { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "{verdict} {} ({}ms)", result.name, result.duration);
            if !result.status && !result.message.is_empty() {
                for line in result.message.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }

        for warning in &self.summary.warnings {
            let _ = writeln!(out, "WARN {warning}");
        }

        let failed = self.summary.failed_tests().count();
        let _ = writeln!(
            out,
            "{} test(s), {} failed, exit status {}",
            self.summary.per_test.len(),
            failed,
            self.summary.exit_code.map_or_else(|| "none".to_string(), |code| code.to_string())
        );

        if self.shutdown.error {
            let _ = writeln!(out, "unable to shut down cluster");
        }
        if self.kept_data {
            let _ = writeln!(out, "run directory kept at {}", self.run_root.display());
        }
        let _ = writeln!(out, "finished {}", self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = write!(out, "{}", if self.passed() { "OK" } else { "FAILED" });
        out
    }
}
