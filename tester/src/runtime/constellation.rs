//! Cluster Constellation Management
//!
//! Brings a cluster up through the orchestrator library, runs a test binary
//! against it and takes it down again.

use std::sync::Arc;
use std::time::Duration;

use orchestrator::{
    CommandSpec, HttpStatusSource, LifecycleController, LiveStatusSource, OrchestratorResult, ProcessSpawner,
    RunRecord, ShutdownReport, TestRunSummary, TestRunner, TokioSpawner,
};

use shared::{logging, process_error, process_info, process_warn, ProcessId};

use super::report::SuiteReport;
use crate::config::SuiteConfig;

/// Timeout for each live status request
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ClusterConstellation<S: ProcessSpawner, L: LiveStatusSource> {
    controller: LifecycleController<S, L>,
}

impl ClusterConstellation<TokioSpawner, HttpStatusSource> {
    /// Constellation of real processes queried over HTTP
    pub fn from_config(config: &SuiteConfig) -> OrchestratorResult<Self> {
        let controller = LifecycleController::new(
            config.plan()?,
            config.options()?,
            Arc::new(TokioSpawner::new()),
            HttpStatusSource::new(STATUS_TIMEOUT)?,
        );
        Ok(Self::new(controller))
    }
}

impl<S: ProcessSpawner, L: LiveStatusSource> ClusterConstellation<S, L> {
    pub fn new(controller: LifecycleController<S, L>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &LifecycleController<S, L> {
        &self.controller
    }

    /// Launch the cluster and wait until it is healthy
    ///
    /// A cluster that never becomes healthy is shut down again before the
    /// error is returned.
    pub async fn start(&mut self) -> OrchestratorResult<RunRecord> {
        process_info!(ProcessId::current(), "🚀 Starting cluster constellation");
        self.controller.launch().await?;

        if let Err(e) = self.controller.wait_until_healthy().await {
            process_error!(ProcessId::current(), "❌ Cluster did not become healthy: {}", e);
            if let Err(stop_err) = self.controller.shutdown().await {
                process_warn!(ProcessId::current(), "⚠️ Failed to stop unhealthy cluster: {}", stop_err);
            }
            return Err(e);
        }

        let record = self.controller.record().cloned().ok_or(orchestrator::OrchestratorError::NotLaunched)?;
        process_info!(ProcessId::current(), "✅ Cluster healthy at {}", record.url());
        Ok(record)
    }

    /// Run a test binary against the running cluster
    pub async fn run_tests(&self, runner: &TestRunner, command: &CommandSpec) -> OrchestratorResult<TestRunSummary> {
        let record = self.controller.record().ok_or(orchestrator::OrchestratorError::NotLaunched)?;
        logging::log_progress(ProcessId::current(), "Running tests", &command.program.display().to_string());
        runner.run(command, record).await
    }

    /// Shut the cluster down and remove its data unless asked to keep it
    pub async fn stop(&mut self, keep_data: bool) -> OrchestratorResult<ShutdownReport> {
        process_info!(ProcessId::current(), "🛑 Shutting down cluster constellation");
        let report = self.controller.shutdown().await?;

        if report.error {
            process_error!(ProcessId::current(), "❌ unable to shut down cluster; run directory kept");
        } else if keep_data {
            process_info!(ProcessId::current(), "📁 Keeping run directory");
        } else {
            self.controller.cleanup().await?;
        }
        Ok(report)
    }

    /// Start, test, stop
    ///
    /// The cluster is stopped even when the test binary cannot be run.
    pub async fn execute(
        &mut self,
        runner: &TestRunner,
        command: &CommandSpec,
        keep_data: bool,
    ) -> OrchestratorResult<SuiteReport> {
        let record = self.start().await?;

        let tested = self.run_tests(runner, command).await;
        let shutdown = self.stop(keep_data).await?;
        let summary = tested?;

        Ok(SuiteReport {
            endpoint: record.endpoint,
            run_root: record.run_root,
            summary,
            kept_data: keep_data || shutdown.error,
            shutdown,
            finished_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use orchestrator::traits::{MockLiveStatusSource, MockProcessSpawner};
    use orchestrator::{LifecycleState, LiveStatus, OrchestratorError, OrchestratorOptions, PortAllocator, ProcessLauncher, TerminationOutcome, TopologyPlanner};
    use shared::Role;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn constellation(base: &std::path::Path, healthy: bool) -> ClusterConstellation<MockProcessSpawner, MockLiveStatusSource> {
        let mut spawner = MockProcessSpawner::new();
        let next_pid = AtomicU32::new(100);
        spawner.expect_spawn().returning(move |_| Ok(next_pid.fetch_add(1, Ordering::SeqCst)));
        spawner
            .expect_terminate()
            .returning(|_, _| Ok(TerminationOutcome::Exited { code: Some(0) }));
        spawner.expect_is_running().returning(|_| true);

        let mut status = MockLiveStatusSource::new();
        status.expect_fetch().returning(move |record| {
            let serving = if healthy {
                record.instances_of(Role::DbServer).map(|i| i.name.clone()).collect()
            } else {
                Default::default()
            };
            Ok(LiveStatus {
                serving,
                ..LiveStatus::default()
            })
        });

        let options = OrchestratorOptions::builder()
            .executable("/opt/db/bin/server")
            .base_dir(base)
            .crash_monitor(None)
            .health_polling(Duration::from_millis(1), 2)
            .build()
            .unwrap();
        let plan = TopologyPlanner::new().with_agency_size(1).plan_single_host("127.0.0.1", 1, 1).unwrap();
        let launcher = ProcessLauncher::new(Arc::new(spawner), options).with_ports(Arc::new(PortAllocator::with_probe(|_| true)));
        ClusterConstellation::new(LifecycleController::with_launcher(plan, launcher, status))
    }

    #[tokio::test]
    async fn test_start_and_stop_removes_data() {
        let base = tempfile::tempdir().unwrap();
        let mut constellation = constellation(base.path(), true);

        let record = constellation.start().await.unwrap();
        assert_eq!(record.instances.len(), 3);
        assert_eq!(constellation.controller().state(), LifecycleState::HealthChecked);

        let report = constellation.stop(false).await.unwrap();
        assert!(!report.error);
        assert!(!record.run_root.exists());
        assert_eq!(constellation.controller().state(), LifecycleState::CleanedUp);
    }

    #[tokio::test]
    async fn test_keep_data_leaves_run_directory() {
        let base = tempfile::tempdir().unwrap();
        let mut constellation = constellation(base.path(), true);

        let record = constellation.start().await.unwrap();
        constellation.stop(true).await.unwrap();

        assert!(record.run_root.is_dir());
        assert_eq!(constellation.controller().state(), LifecycleState::ShutdownComplete);
    }

    #[tokio::test]
    async fn test_unhealthy_cluster_is_stopped() {
        let base = tempfile::tempdir().unwrap();
        let mut constellation = constellation(base.path(), false);

        let result = constellation.start().await;

        assert_matches!(result, Err(OrchestratorError::HealthTimeout { attempts: 2 }));
        assert_eq!(constellation.controller().state(), LifecycleState::ShutdownComplete);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_runs_binary_against_cluster() {
        let base = tempfile::tempdir().unwrap();
        let mut constellation = constellation(base.path(), true);
        let command = CommandSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '{"Test":"%s","Action":"pass","Elapsed":0.002}\n' "$CLUSTER_ENDPOINT""#.to_string(),
            ],
        );

        let report = constellation.execute(&TestRunner::new(), &command, false).await.unwrap();

        assert!(report.passed());
        assert!(report.summary.per_test.contains_key(&report.endpoint));
        assert!(!report.run_root.exists());
        assert!(!report.kept_data);
    }

    #[tokio::test]
    async fn test_missing_test_binary_still_stops_cluster() {
        let base = tempfile::tempdir().unwrap();
        let mut constellation = constellation(base.path(), true);
        let command = CommandSpec::new(base.path().join("no-such-binary"), Vec::new());

        let result = constellation.execute(&TestRunner::new(), &command, false).await;

        assert_matches!(result, Err(OrchestratorError::SpawnFailed { .. }));
        assert_eq!(constellation.controller().state(), LifecycleState::CleanedUp);
    }
}
