//! Lifecycle controller
//!
//! Owns one deployment's plan, run record and lifecycle state, and sequences
//! launch, health checks, shutdown, cleanup and relaunch.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::{process_debug, process_error, process_info, process_warn, ProcessId, Role};

use crate::config::{ConfigKey, LaunchArgs, OrchestratorOptions};
use crate::core::{HealthEntry, HealthMonitor, HealthStatus, InstanceInfo, LifecycleState, Placement, Plan, RunRecord};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::launcher::{LaunchRequest, ProcessLauncher};
use crate::services::quorum::QuorumBootstrapper;
use crate::traits::{LiveStatusSource, ProcessSpawner, TerminationOutcome};

/// Shutdown result for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceShutdown {
    pub name: String,
    pub pid: Option<u32>,
    pub clean: bool,
    pub exit_code: Option<i32>,
    pub killed: bool,
    pub error: Option<String>,
}

/// Aggregate shutdown result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// At least one instance did not terminate cleanly
    pub error: bool,
    pub results: Vec<InstanceShutdown>,
}

impl ShutdownReport {
    /// HTTP-style status for control surfaces
    pub fn status_code(&self) -> u16 {
        if self.error {
            500
        } else {
            200
        }
    }
}

pub struct LifecycleController<S: ProcessSpawner, L: LiveStatusSource> {
    launcher: ProcessLauncher<S>,
    status: L,
    plan: Plan,
    record: Option<RunRecord>,
    state: LifecycleState,
    /// Instances already confirmed stopped by a shutdown attempt
    stopped: HashSet<String>,
    /// Run roots of earlier launches, removed together with the current one
    retired_roots: Vec<PathBuf>,
}

impl<S: ProcessSpawner, L: LiveStatusSource> LifecycleController<S, L> {
    pub fn new(plan: Plan, options: OrchestratorOptions, spawner: Arc<S>, status: L) -> Self {
        Self::with_launcher(plan, ProcessLauncher::new(spawner, options), status)
    }

    pub fn with_launcher(plan: Plan, launcher: ProcessLauncher<S>, status: L) -> Self {
        Self {
            launcher,
            status,
            plan,
            record: None,
            state: LifecycleState::Planned,
            stopped: HashSet::new(),
            retired_roots: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn record(&self) -> Option<&RunRecord> {
        self.record.as_ref()
    }

    pub fn launcher(&self) -> &ProcessLauncher<S> {
        &self.launcher
    }

    /// Launch the planned deployment
    pub async fn launch(&mut self) -> OrchestratorResult<&RunRecord> {
        if !self.state.can_launch() {
            return Err(OrchestratorError::transition(self.state, "launch"));
        }

        let plan = self.plan.clone();
        let record = self.launch_plan(&plan).await?;
        self.install(record);
        self.current()
    }

    /// Reconcile the plan with the live status view
    ///
    /// Unlike a pure read, the first successful check moves `Launched` to
    /// `HealthChecked`; later checks leave the state alone.
    pub async fn health_check(&mut self) -> OrchestratorResult<Vec<HealthEntry>> {
        if !self.state.is_post_launch() {
            return Err(OrchestratorError::transition(self.state, "health check"));
        }
        let record = self.record.as_ref().ok_or(OrchestratorError::NotLaunched)?;

        let live = self.status.fetch(record).await?;
        let entries = HealthMonitor::check(&record.plan, &live);

        if self.state == LifecycleState::Launched {
            self.set_state(LifecycleState::HealthChecked);
        }
        Ok(entries)
    }

    /// Poll health until every instance is good or the attempt bound runs out
    pub async fn wait_until_healthy(&mut self) -> OrchestratorResult<Vec<HealthEntry>> {
        if !self.state.is_running() {
            return Err(OrchestratorError::transition(self.state, "wait until healthy"));
        }
        let attempts = self.launcher.options().health_attempts;
        let interval = self.launcher.options().health_interval;

        for attempt in 1..=attempts {
            self.ensure_alive().await?;

            match self.health_check().await {
                Ok(entries) if HealthMonitor::all_good(&entries) => {
                    process_info!(ProcessId::current(), "💚 Deployment healthy after {} attempt(s)", attempt);
                    return Ok(entries);
                }
                Ok(entries) => {
                    let pending: Vec<_> = entries.iter().filter(|e| e.status != HealthStatus::Good).map(|e| e.id.as_str()).collect();
                    process_debug!(ProcessId::current(), "⏳ Attempt {}/{}: waiting for {:?}", attempt, attempts, pending);
                }
                Err(e @ (OrchestratorError::InvalidTransition { .. } | OrchestratorError::NotLaunched)) => return Err(e),
                Err(e) => {
                    process_debug!(ProcessId::current(), "⏳ Attempt {}/{}: status unavailable: {}", attempt, attempts, e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        process_error!(ProcessId::current(), "❌ Deployment not healthy after {} attempts", attempts);
        Err(OrchestratorError::HealthTimeout { attempts })
    }

    /// Terminate every instance, routers first and the quorum last
    pub async fn shutdown(&mut self) -> OrchestratorResult<ShutdownReport> {
        if !self.state.can_shutdown() {
            return Err(OrchestratorError::transition(self.state, "shutdown"));
        }
        let record = self.record.as_ref().ok_or(OrchestratorError::NotLaunched)?;

        let mut order = Vec::with_capacity(record.instances.len());
        for role in Role::LAUNCH_ORDER.iter().rev() {
            order.extend(record.instances_of(*role).cloned());
        }

        self.set_state(LifecycleState::ShuttingDown);

        let mut results = Vec::with_capacity(order.len());
        for instance in &order {
            if self.stopped.contains(&instance.name) {
                continue;
            }

            let result = match self.launcher.terminate(instance).await {
                Ok(outcome) => InstanceShutdown {
                    name: instance.name.clone(),
                    pid: instance.pid(),
                    clean: outcome.is_clean(),
                    exit_code: outcome.exit_code(),
                    killed: outcome == TerminationOutcome::Killed,
                    error: None,
                },
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Failed to stop {}: {}", instance.name, e);
                    InstanceShutdown {
                        name: instance.name.clone(),
                        pid: instance.pid(),
                        clean: false,
                        exit_code: None,
                        killed: false,
                        error: Some(e.to_string()),
                    }
                }
            };

            if result.clean {
                self.stopped.insert(instance.name.clone());
            }
            results.push(result);
        }

        let error = results.iter().any(|r| !r.clean);
        if error {
            process_error!(ProcessId::current(), "❌ Shutdown incomplete; on-disk state is kept");
            self.set_state(LifecycleState::ShutdownFailed);
        } else {
            process_info!(ProcessId::current(), "🛑 All {} instance(s) stopped", order.len());
            self.set_state(LifecycleState::ShutdownComplete);
        }

        Ok(ShutdownReport { error, results })
    }

    /// Remove the deployment's on-disk state
    ///
    /// Only a completed shutdown permits removal. After a failed shutdown this
    /// is a no-op reporting [`OrchestratorError::ShutdownIncomplete`].
    pub async fn cleanup(&mut self) -> OrchestratorResult<()> {
        match self.state {
            LifecycleState::ShutdownComplete => {}
            LifecycleState::ShutdownFailed => {
                process_error!(ProcessId::current(), "❌ unable to shut down cluster; refusing to remove its data");
                return Err(OrchestratorError::ShutdownIncomplete);
            }
            state => return Err(OrchestratorError::transition(state, "cleanup")),
        }

        let run_root = self.current()?.run_root.clone();
        let mut roots = self.retired_roots.clone();
        roots.push(run_root.clone());

        for root in &roots {
            self.launcher.directories().remove(root).await?;
        }

        self.retired_roots.clear();
        self.set_state(LifecycleState::CleanedUp);
        process_info!(ProcessId::current(), "🧹 Removed run directory {}", run_root.display());
        Ok(())
    }

    /// Launch `plan` afresh, replacing the current deployment
    ///
    /// A running deployment is shut down first. On failure the previous record
    /// stays current and the error reads "unable to relaunch".
    pub async fn relaunch(&mut self, plan: Plan) -> OrchestratorResult<&RunRecord> {
        if !self.state.can_relaunch() {
            return Err(OrchestratorError::transition(self.state, "relaunch"));
        }

        if self.state.can_shutdown() {
            let report = self.shutdown().await.map_err(|e| OrchestratorError::RelaunchFailed { reason: e.to_string() })?;
            if report.error {
                return Err(OrchestratorError::RelaunchFailed {
                    reason: OrchestratorError::ShutdownIncomplete.to_string(),
                });
            }
        }

        let previous = self.state;
        self.set_state(LifecycleState::Relaunching);

        match self.launch_plan(&plan).await {
            Ok(record) => {
                if let Some(old) = self.record.take() {
                    self.retired_roots.push(old.run_root);
                }
                self.plan = plan;
                self.install(record);
                process_info!(ProcessId::current(), "🔁 Relaunched deployment");
                self.current()
            }
            Err(e) => {
                self.set_state(previous);
                process_error!(ProcessId::current(), "❌ unable to relaunch: {}", e);
                Err(OrchestratorError::RelaunchFailed { reason: e.to_string() })
            }
        }
    }

    /// Launch `plan` into a new run root, removing the root again on failure
    async fn launch_plan(&self, plan: &Plan) -> OrchestratorResult<RunRecord> {
        let run_root = self.launcher.directories().create_run_root().await?;
        process_info!(ProcessId::current(), "🚀 Launching {} instance(s) under {}", plan.placements.len(), run_root.display());

        match self.launch_into(plan, &run_root).await {
            Ok(record) => Ok(record),
            Err(e) => {
                if let Err(remove_err) = self.launcher.directories().remove(&run_root).await {
                    process_warn!(ProcessId::current(), "⚠️ Failed to remove {}: {}", run_root.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    async fn launch_into(&self, plan: &Plan, run_root: &Path) -> OrchestratorResult<RunRecord> {
        let mut record = QuorumBootstrapper::new(&self.launcher).bootstrap(plan, run_root).await?;
        let agency_endpoint = record.endpoint.clone();

        for role in [Role::DbServer, Role::Coordinator] {
            for placement in plan.placements_for(role) {
                let launched = self.launch_member(plan, placement, run_root, &agency_endpoint).await;
                match launched {
                    Ok(instance) => {
                        record.endpoint = instance.endpoint.clone();
                        record.instances.push(instance);
                    }
                    Err(e) => {
                        process_error!(ProcessId::current(), "❌ Launch failed at {}, rolling back: {}", placement.instance_id(), e);
                        self.launcher.rollback(&record.instances).await;
                        return Err(e);
                    }
                }
            }
        }

        Ok(record)
    }

    async fn launch_member(
        &self,
        plan: &Plan,
        placement: &Placement,
        run_root: &Path,
        agency_endpoint: &str,
    ) -> OrchestratorResult<InstanceInfo> {
        let request = LaunchRequest::for_placement(plan, placement, run_root)?;
        let (_, endpoint) = self.launcher.allocate_endpoint(&request.address).await?;

        let mut overrides = LaunchArgs::new()
            .with(ConfigKey::ServerEndpoint, endpoint.clone())?
            .with(ConfigKey::ClusterMyAddress, endpoint)?
            .with(ConfigKey::ClusterAgencyEndpoint, agency_endpoint)?;
        if let Some(cluster_role) = placement.role.cluster_role() {
            overrides.set(ConfigKey::ClusterMyRole, cluster_role)?;
        }

        self.launcher.launch(request.with_overrides(overrides)).await
    }

    /// Fail fast when a launched process has died
    async fn ensure_alive(&self) -> OrchestratorResult<()> {
        let Some(record) = self.record.as_ref() else {
            return Err(OrchestratorError::NotLaunched);
        };

        for instance in &record.instances {
            if let Some(pid) = instance.pid() {
                if !self.launcher.spawner().is_running(pid).await {
                    process_error!(ProcessId::current(), "💀 {} (PID: {}) is gone", instance.name, pid);
                    return Err(OrchestratorError::InstanceExited {
                        name: instance.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn install(&mut self, mut record: RunRecord) {
        record.state = LifecycleState::Launched;
        self.record = Some(record);
        self.stopped.clear();
        self.state = LifecycleState::Launched;
    }

    fn set_state(&mut self, state: LifecycleState) {
        process_debug!(ProcessId::current(), "🔄 Lifecycle {} -> {}", self.state, state);
        self.state = state;
        if let Some(record) = self.record.as_mut() {
            record.state = state;
        }
    }

    fn current(&self) -> OrchestratorResult<&RunRecord> {
        self.record.as_ref().ok_or(OrchestratorError::NotLaunched)
    }
}
