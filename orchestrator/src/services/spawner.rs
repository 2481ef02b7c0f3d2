//! Real process spawning service implementation
//!
//! Starts detached OS processes and terminates them gracefully: SIGTERM
//! first, SIGKILL once the grace period runs out.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{CommandSpec, OutputMode, ProcessSpawner, TerminationOutcome};
use shared::{process_debug, process_warn, ProcessId};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_SETTLE: Duration = Duration::from_millis(200);

/// Spawner backed by `tokio::process`
///
/// Children spawned here are kept so their exit status can be collected;
/// pids from elsewhere are handled through signals alone.
pub struct TokioSpawner {
    children: Mutex<HashMap<u32, Child>>,
}

impl TokioSpawner {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Number of children spawned here that have not been reaped
    pub async fn tracked(&self) -> usize {
        self.children.lock().await.len()
    }

    async fn terminate_child(&self, pid: u32, mut child: Child, grace: Duration) -> OrchestratorResult<TerminationOutcome> {
        if let Some(status) = child.try_wait()? {
            process_debug!(ProcessId::current(), "✅ Process {} had already exited ({})", pid, status);
            return Ok(TerminationOutcome::AlreadyExited { code: status.code() });
        }

        Self::request_exit(pid, &mut child)?;

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status?;
                process_debug!(ProcessId::current(), "✅ Process {} terminated gracefully ({})", pid, status);
                Ok(TerminationOutcome::Exited { code: status.code() })
            }
            Err(_) => {
                process_warn!(ProcessId::current(), "🔨 Process {} ignored SIGTERM for {:?}, killing", pid, grace);
                child.kill().await?;
                Ok(TerminationOutcome::Killed)
            }
        }
    }

    #[cfg(unix)]
    fn request_exit(pid: u32, _child: &mut Child) -> OrchestratorResult<()> {
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::from(e).into()),
        }
    }

    #[cfg(not(unix))]
    fn request_exit(_pid: u32, child: &mut Child) -> OrchestratorResult<()> {
        child.start_kill()?;
        Ok(())
    }

    #[cfg(unix)]
    async fn terminate_foreign(&self, pid: u32, grace: Duration) -> OrchestratorResult<TerminationOutcome> {
        let nix_pid = Pid::from_raw(pid as i32);

        match signal::kill(nix_pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(nix::errno::Errno::ESRCH) => return Ok(TerminationOutcome::AlreadyExited { code: None }),
            Err(e) => return Err(std::io::Error::from(e).into()),
        }

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !process_exists(pid)? {
                return Ok(TerminationOutcome::Exited { code: None });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        process_warn!(ProcessId::current(), "🔨 Process {} ignored SIGTERM for {:?}, killing", pid, grace);
        match signal::kill(nix_pid, Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => return Err(std::io::Error::from(e).into()),
        }
        tokio::time::sleep(KILL_SETTLE).await;

        if process_exists(pid)? {
            return Err(std::io::Error::other(format!("process {pid} still exists after SIGKILL")).into());
        }
        Ok(TerminationOutcome::Killed)
    }

    #[cfg(not(unix))]
    async fn terminate_foreign(&self, pid: u32, _grace: Duration) -> OrchestratorResult<TerminationOutcome> {
        Err(std::io::Error::other(format!("process {pid} was not started by this orchestrator")).into())
    }
}

impl Default for TokioSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    async fn spawn(&self, spec: &CommandSpec) -> OrchestratorResult<u32> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env).stdin(Stdio::null());

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        match spec.output {
            OutputMode::Discard => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
            OutputMode::Inherit => cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
        };

        let child = cmd.spawn().map_err(|e| OrchestratorError::spawn(spec.display(), e))?;
        let pid = child
            .id()
            .ok_or_else(|| OrchestratorError::spawn(spec.display(), "process exited before its pid was read"))?;

        process_debug!(ProcessId::current(), "🚀 Spawned {} (PID: {})", spec.program.display(), pid);
        self.children.lock().await.insert(pid, child);
        Ok(pid)
    }

    async fn terminate(&self, pid: u32, grace: Duration) -> OrchestratorResult<TerminationOutcome> {
        let child = self.children.lock().await.remove(&pid);

        match child {
            Some(child) => self.terminate_child(pid, child, grace).await,
            None => self.terminate_foreign(pid, grace).await,
        }
    }

    async fn is_running(&self, pid: u32) -> bool {
        let mut children = self.children.lock().await;
        if let Some(child) = children.get_mut(&pid) {
            return matches!(child.try_wait(), Ok(None));
        }
        drop(children);

        #[cfg(unix)]
        {
            process_exists(pid).unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> OrchestratorResult<bool> {
    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(e) => Err(std::io::Error::from(e).into()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sleeper(seconds: &str) -> CommandSpec {
        CommandSpec::new("sleep", vec![seconds.to_string()])
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let spawner = TokioSpawner::new();
        let pid = spawner.spawn(&sleeper("30")).await.unwrap();
        assert!(spawner.is_running(pid).await);

        let outcome = spawner.terminate(pid, Duration::from_secs(5)).await.unwrap();
        assert_matches!(outcome, TerminationOutcome::Exited { .. });
        assert!(outcome.is_clean());
        assert_eq!(spawner.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_already_exited_child() {
        let spawner = TokioSpawner::new();
        let pid = spawner.spawn(&CommandSpec::new("true", vec![])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let outcome = spawner.terminate(pid, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, TerminationOutcome::AlreadyExited { code: Some(0) });
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let spawner = TokioSpawner::new();
        let spec = CommandSpec::new("sh", vec!["-c".into(), "trap '' TERM; sleep 30".into()]);
        let pid = spawner.spawn(&spec).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = spawner.terminate(pid, Duration::from_millis(300)).await.unwrap();
        assert_eq!(outcome, TerminationOutcome::Killed);
        assert!(!outcome.is_clean());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let spawner = TokioSpawner::new();
        let result = spawner.spawn(&CommandSpec::new("/nonexistent/server-binary", vec![])).await;
        assert_matches!(result, Err(OrchestratorError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_pid_is_already_gone() {
        let spawner = TokioSpawner::new();
        // pid_max on Linux never reaches this value
        let outcome = spawner.terminate(i32::MAX as u32 - 1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(outcome, TerminationOutcome::AlreadyExited { code: None });
    }
}
