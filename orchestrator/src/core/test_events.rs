//! Test-result event stream reduction
//!
//! Test binaries report progress as newline-delimited JSON records of the form
//! `{"Test": "...", "Action": "...", "Output": "...", "Elapsed": 0.01}`. The
//! reducer accepts raw bytes in arbitrary chunks and folds complete lines into
//! a per-test result map.

use serde::{Deserialize, Serialize};
use shared::{process_info, process_warn, ProcessId};
use std::collections::BTreeMap;

/// One record of the stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestEvent {
    #[serde(rename = "Test")]
    pub test: Option<String>,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Output")]
    pub output: Option<String>,
    #[serde(rename = "Elapsed")]
    pub elapsed: Option<f64>,
}

/// Result for one test case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestEventResult {
    pub name: String,
    pub status: bool,
    /// Milliseconds
    pub duration: u64,
    pub message: String,
    #[serde(skip)]
    completed: bool,
}

impl TestEventResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: false,
            duration: 0,
            message: String::new(),
            completed: false,
        }
    }

    fn complete(&mut self, status: bool, elapsed: Option<f64>) {
        self.status = status;
        if let Some(seconds) = elapsed {
            self.duration = (seconds * 1000.0).round().max(0.0) as u64;
        }
        self.completed = true;
    }
}

/// Final verdict of a consumed stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRunSummary {
    pub per_test: BTreeMap<String, TestEventResult>,
    pub overall: bool,
    pub warnings: Vec<String>,
    pub exit_code: Option<i32>,
}

impl TestRunSummary {
    pub fn failed_tests(&self) -> impl Iterator<Item = &TestEventResult> {
        self.per_test.values().filter(|result| !result.status)
    }
}

/// Prefixes of informational output lines emitted outside any test
const INFORMATIONAL_PREFIXES: [&str; 11] = [
    "PASS",
    "FAIL",
    "ok ",
    "ok\t",
    "?",
    "coverage:",
    "=== ",
    "--- ",
    "testing:",
    "exit status",
    "panic:",
];

/// Package-level actions that carry no per-test meaning
const INFORMATIONAL_ACTIONS: [&str; 7] = ["start", "run", "pass", "fail", "skip", "pause", "cont"];

/// Incremental reducer over raw stream bytes
///
/// Per-test output is echoed through the log as it arrives unless disabled
/// with [`EventStreamReducer::with_echo`].
#[derive(Debug)]
pub struct EventStreamReducer {
    buffer: Vec<u8>,
    results: BTreeMap<String, TestEventResult>,
    warnings: Vec<String>,
    stream_ok: bool,
    echo: bool,
    echoed: usize,
}

impl Default for EventStreamReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamReducer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            results: BTreeMap::new(),
            warnings: Vec::new(),
            stream_ok: true,
            echo: true,
            echoed: 0,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Output lines echoed so far
    pub fn echoed(&self) -> usize {
        self.echoed
    }

    /// Append a chunk and process every complete line in the buffer
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.process_line(&line);
        }
    }

    pub fn results(&self) -> &BTreeMap<String, TestEventResult> {
        &self.results
    }

    /// Verdict so far, ignoring the exit code and unfinished tests
    pub fn stream_ok(&self) -> bool {
        self.stream_ok && self.results.values().all(|r| r.status || !r.completed)
    }

    /// Close the stream and combine it with the process exit code
    ///
    /// A trailing line without a newline is still processed. Tests that never
    /// reached a terminal action count as failed.
    pub fn finish(mut self, exit_code: Option<i32>) -> TestRunSummary {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(&line);
        }

        for result in self.results.values_mut() {
            if !result.completed {
                result.status = false;
                if result.message.is_empty() {
                    result.message = "test did not report a result".to_string();
                }
            }
        }

        let tests_ok = self.results.values().all(|result| result.status);
        let overall = self.stream_ok && tests_ok && exit_code == Some(0);

        TestRunSummary {
            per_test: self.results,
            overall,
            warnings: self.warnings,
            exit_code,
        }
    }

    fn process_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }

        let event: TestEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                self.warn(format!("unparseable event line ({e}): {line}"));
                return;
            }
        };

        match event.test.as_deref() {
            Some(name) => self.apply_test_event(name, &event),
            None => self.apply_informational(&event),
        }
    }

    fn apply_test_event(&mut self, name: &str, event: &TestEvent) {
        let echo = self.echo;
        let entry = self
            .results
            .entry(name.to_string())
            .or_insert_with(|| TestEventResult::new(name));

        match event.action.as_str() {
            "run" | "pause" | "cont" | "bench" => {}
            "output" => {
                if let Some(output) = &event.output {
                    entry.message.push_str(output);
                    if echo {
                        process_info!(ProcessId::current(), "{}", output.trim_end());
                        self.echoed += 1;
                    }
                }
            }
            "pass" | "skip" => entry.complete(true, event.elapsed),
            "fail" => entry.complete(false, event.elapsed),
            other => {
                let warning = format!("unknown action '{other}' for test {name}");
                self.warn(warning);
            }
        }
    }

    fn apply_informational(&mut self, event: &TestEvent) {
        let classified = match event.action.as_str() {
            "output" => event.output.as_deref().map_or(true, |output| {
                let text = output.trim();
                text.is_empty() || INFORMATIONAL_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
            }),
            action => INFORMATIONAL_ACTIONS.contains(&action),
        };

        if !classified {
            let text = event.output.as_deref().unwrap_or("").trim_end().to_string();
            self.warn(format!("unexpected informational event '{}': {}", event.action, text));
        }
    }

    fn warn(&mut self, warning: String) {
        process_warn!(ProcessId::current(), "⚠️ {}", warning);
        self.warnings.push(warning);
        self.stream_ok = false;
    }
}
