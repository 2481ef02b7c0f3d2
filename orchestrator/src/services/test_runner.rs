//! Third-party test binaries against a running deployment
//!
//! The test binary is spawned with the deployment's endpoint in its
//! environment and its stdout piped into the event stream parser.

use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

use shared::{process_info, process_warn, ProcessId};

use crate::core::{RunRecord, TestRunSummary};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::event_stream::SubprocessEventStreamParser;
use crate::traits::CommandSpec;

pub const ENV_ENDPOINT: &str = "CLUSTER_ENDPOINT";
pub const ENV_URL: &str = "CLUSTER_URL";
pub const ENV_RUN_ROOT: &str = "CLUSTER_RUN_ROOT";

#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    parser: SubprocessEventStreamParser,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo test output through the log; on by default
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.parser = self.parser.with_echo(echo);
        self
    }

    /// Environment handed to a test binary for `record`
    pub fn environment(record: &RunRecord) -> HashMap<String, String> {
        HashMap::from([
            (ENV_ENDPOINT.to_string(), record.endpoint.clone()),
            (ENV_URL.to_string(), record.url()),
            (ENV_RUN_ROOT.to_string(), record.run_root.to_string_lossy().into_owned()),
        ])
    }

    /// Run `command` to completion against `record`
    ///
    /// Variables from the command's own environment win over the ones
    /// describing the deployment.
    pub async fn run(&self, command: &CommandSpec, record: &RunRecord) -> OrchestratorResult<TestRunSummary> {
        let mut env = Self::environment(record);
        env.extend(command.env.clone());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| OrchestratorError::spawn(command.display(), e))?;
        process_info!(
            ProcessId::current(),
            "🧪 Running {} (PID: {}) against {}",
            command.program.display(),
            child.id().unwrap_or(0),
            record.endpoint
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::spawn(command.display(), "stdout was not captured"))?;
        let reducer = self.parser.consume(stdout).await?;
        let status = child.wait().await?;

        let summary = reducer.finish(status.code());
        if !summary.overall {
            process_warn!(
                ProcessId::current(),
                "❌ Test run failed: {} failing test(s), {} warning(s), exit status {}",
                summary.failed_tests().count(),
                summary.warnings.len(),
                status
            );
        }
        Ok(summary)
    }
}
