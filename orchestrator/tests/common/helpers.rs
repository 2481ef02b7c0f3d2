//! Test helpers and builder patterns for orchestrator tests
//!
//! `ControllerBuilder` wires a `LifecycleController` to a mocked spawner and
//! a mocked live status source with sensible defaults: every spawn succeeds
//! with an increasing pid, every process stays alive and exits cleanly, and
//! every data server reports as serving.
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchestrator::traits::{MockLiveStatusSource, MockProcessSpawner};
use orchestrator::*;
use shared::Role;

use super::fixtures::TestFixtures;

pub type TestController = LifecycleController<MockProcessSpawner, MockLiveStatusSource>;

type TerminateFn = Box<dyn FnMut(u32, Duration) -> OrchestratorResult<TerminationOutcome> + Send>;
type RunningFn = Box<dyn FnMut(u32) -> bool + Send>;
type StatusFn = Box<dyn FnMut(&RunRecord) -> OrchestratorResult<LiveStatus> + Send>;

/// Builder for controllers driven by mocks
pub struct ControllerBuilder {
    plan: Plan,
    fail_spawns_from: Option<u32>,
    terminate: TerminateFn,
    is_running: RunningFn,
    status: StatusFn,
    terminated: Arc<Mutex<Vec<u32>>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            plan: TestFixtures::plan(),
            fail_spawns_from: None,
            terminate: Box::new(|_, _| Ok(TerminationOutcome::Exited { code: Some(0) })),
            is_running: Box::new(|_| true),
            status: Box::new(|record| Ok(TestHelpers::healthy_view(record))),
            terminated: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = plan;
        self
    }

    /// Fail the `n`th spawn (1-based) and every spawn after it
    pub fn failing_spawns_from(mut self, n: u32) -> Self {
        self.fail_spawns_from = Some(n);
        self
    }

    pub fn with_terminate<F>(mut self, f: F) -> Self
    where
        F: FnMut(u32, Duration) -> OrchestratorResult<TerminationOutcome> + Send + 'static,
    {
        self.terminate = Box::new(f);
        self
    }

    pub fn with_is_running<F>(mut self, f: F) -> Self
    where
        F: FnMut(u32) -> bool + Send + 'static,
    {
        self.is_running = Box::new(f);
        self
    }

    pub fn with_status<F>(mut self, f: F) -> Self
    where
        F: FnMut(&RunRecord) -> OrchestratorResult<LiveStatus> + Send + 'static,
    {
        self.status = Box::new(f);
        self
    }

    /// Pids passed to `terminate`, in call order
    pub fn terminated(&self) -> Arc<Mutex<Vec<u32>>> {
        self.terminated.clone()
    }

    pub fn build(self, base: &Path) -> TestController {
        let Self {
            plan,
            fail_spawns_from,
            mut terminate,
            mut is_running,
            mut status,
            terminated,
        } = self;

        let mut spawner = MockProcessSpawner::new();
        let spawns = AtomicU32::new(0);
        let next_pid = AtomicU32::new(TestFixtures::FIRST_PID);
        spawner.expect_spawn().returning(move |command| {
            let n = spawns.fetch_add(1, Ordering::SeqCst) + 1;
            match fail_spawns_from {
                Some(limit) if n >= limit => Err(OrchestratorError::spawn(command.display(), "spawn refused by test")),
                _ => Ok(next_pid.fetch_add(1, Ordering::SeqCst)),
            }
        });
        spawner.expect_terminate().returning(move |pid, grace| {
            terminated.lock().unwrap().push(pid);
            terminate(pid, grace)
        });
        spawner.expect_is_running().returning(move |pid| is_running(pid));

        let mut source = MockLiveStatusSource::new();
        source.expect_fetch().returning(move |record| status(record));

        let launcher = ProcessLauncher::new(Arc::new(spawner), TestFixtures::options(base))
            .with_ports(Arc::new(PortAllocator::with_probe(|_| true)));
        LifecycleController::with_launcher(plan, launcher, source)
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Common test helper functions
pub struct TestHelpers;

impl TestHelpers {
    /// Live view in which every launched data server is serving
    pub fn healthy_view(record: &RunRecord) -> LiveStatus {
        LiveStatus {
            serving: record.instances_of(Role::DbServer).map(|i| i.name.clone()).collect(),
            ..LiveStatus::default()
        }
    }

    /// Controller with default mocks, already launched
    pub async fn launched(base: &Path) -> TestController {
        let mut controller = ControllerBuilder::new().build(base);
        controller.launch().await.unwrap();
        controller
    }

    /// Pids of the current record in launch order
    pub fn pids(controller: &TestController) -> Vec<u32> {
        controller
            .record()
            .map(|record| record.instances.iter().filter_map(|i| i.pid()).collect())
            .unwrap_or_default()
    }

    pub fn run_root(controller: &TestController) -> std::path::PathBuf {
        controller.record().unwrap().run_root.clone()
    }

    /// Run roots currently present under `base`
    pub fn run_roots(base: &Path) -> Vec<std::path::PathBuf> {
        let mut roots: Vec<_> = std::fs::read_dir(base)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_dir())
            .collect();
        roots.sort();
        roots
    }
}
