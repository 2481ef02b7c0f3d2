//! Trait definitions with mockall annotations for testing
//!
//! Everything that touches the operating system or the network sits behind
//! one of these traits so the launch and lifecycle logic can be driven by
//! mocks in tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::{LiveStatus, RunRecord};
use crate::error::OrchestratorResult;

/// What to do with a child's standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Send stdout/stderr to the null device
    #[default]
    Discard,
    /// Share the parent's stdout/stderr
    Inherit,
}

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment, built fresh for every spawn
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    /// The command as a single display string
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How a terminated process went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Exited on its own after the polite signal
    Exited { code: Option<i32> },
    /// Had already exited before termination was requested
    AlreadyExited { code: Option<i32> },
    /// Ignored the polite signal and had to be killed
    Killed,
}

impl TerminationOutcome {
    /// Exit status for reporting; killed processes have none
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TerminationOutcome::Exited { code } | TerminationOutcome::AlreadyExited { code } => *code,
            TerminationOutcome::Killed => None,
        }
    }

    /// The process shut down in an orderly fashion
    pub fn is_clean(&self) -> bool {
        match self {
            TerminationOutcome::Exited { .. } => true,
            TerminationOutcome::AlreadyExited { code } => *code == Some(0),
            TerminationOutcome::Killed => false,
        }
    }
}

/// Process management abstraction
///
/// Spawned processes are addressed by OS pid for their whole life.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Start a detached process and return its pid
    async fn spawn(&self, command: &CommandSpec) -> OrchestratorResult<u32>;

    /// Ask the process to exit, escalating to a kill once `grace` has passed
    async fn terminate(&self, pid: u32, grace: Duration) -> OrchestratorResult<TerminationOutcome>;

    /// Whether the process is still alive
    async fn is_running(&self, pid: u32) -> bool;
}

/// Source of the coordination store's view of a running deployment
#[mockall::automock]
#[async_trait::async_trait]
pub trait LiveStatusSource: Send + Sync {
    async fn fetch(&self, record: &RunRecord) -> OrchestratorResult<LiveStatus>;
}
