//! Instance launching
//!
//! Prepares one instance's directories, endpoint and argument set, then
//! starts it through the injected [`ProcessSpawner`]. Returning does not mean
//! the instance is ready; readiness is observed through health checks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::{endpoint_port, make_endpoint, process_debug, process_error, process_info, process_warn, ProcessId, Role};

use crate::config::{ConfigKey, LaunchArgs, OrchestratorOptions};
use crate::core::{HostId, InstanceInfo, LaunchSnapshot, Placement, Plan};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::file_system::{InstanceDirs, RunDirectories};
use crate::services::port_allocator::PortAllocator;
use crate::traits::{CommandSpec, OutputMode, ProcessSpawner, TerminationOutcome};

/// Everything needed to launch one instance
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub role: Role,
    pub index: u32,
    pub host: HostId,
    pub address: String,
    pub run_root: PathBuf,
    /// Highest-precedence arguments for this instance only
    pub overrides: LaunchArgs,
}

impl LaunchRequest {
    /// Request for a planned placement
    pub fn for_placement(plan: &Plan, placement: &Placement, run_root: &Path) -> OrchestratorResult<Self> {
        let host = plan.host(placement.host).ok_or_else(|| {
            OrchestratorError::invalid("host", placement.host.to_string(), "placement refers to an unknown host")
        })?;

        Ok(Self {
            role: placement.role,
            index: placement.index,
            host: placement.host,
            address: host.address.clone(),
            run_root: run_root.to_path_buf(),
            overrides: LaunchArgs::new(),
        })
    }

    pub fn with_overrides(mut self, overrides: LaunchArgs) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.role, self.index)
    }
}

/// Launches instances with layered arguments
pub struct ProcessLauncher<S: ProcessSpawner> {
    spawner: Arc<S>,
    options: OrchestratorOptions,
    ports: Arc<PortAllocator>,
    dirs: RunDirectories,
}

impl<S: ProcessSpawner> ProcessLauncher<S> {
    pub fn new(spawner: Arc<S>, options: OrchestratorOptions) -> Self {
        let dirs = RunDirectories::new(options.base_dir.clone());
        Self {
            spawner,
            options,
            ports: Arc::new(PortAllocator::new()),
            dirs,
        }
    }

    /// Use a specific port allocator (fluent API)
    pub fn with_ports(mut self, ports: Arc<PortAllocator>) -> Self {
        self.ports = ports;
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn directories(&self) -> &RunDirectories {
        &self.dirs
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn spawner(&self) -> &Arc<S> {
        &self.spawner
    }

    /// Reserve a fresh port on `address` and return it with its endpoint
    pub async fn allocate_endpoint(&self, address: &str) -> OrchestratorResult<(u16, String)> {
        let port = self.ports.allocate(self.options.max_port).await?;
        Ok((port, make_endpoint(self.options.protocol, address, port)))
    }

    /// Launch one instance
    pub async fn launch(&self, request: LaunchRequest) -> OrchestratorResult<InstanceInfo> {
        let name = request.name();
        let dirs = self.dirs.create_instance_dirs(&request.run_root, &name).await?;

        let (port, endpoint) = match request.overrides.get(&ConfigKey::ServerEndpoint) {
            Some(endpoint) => {
                let port = endpoint_port(endpoint)?;
                self.ports.reserve(port);
                (port, endpoint.to_string())
            }
            None => self.allocate_endpoint(&request.address).await?,
        };

        let defaults = self.role_defaults(&endpoint, &dirs)?;
        let mut args = LaunchArgs::layered(&[&self.options.base_args, &defaults, &self.options.extra_args, &request.overrides]);
        // the instance must listen where the record says it does
        args.set(ConfigKey::ServerEndpoint, endpoint.clone())?;

        let (program, argv) = self.options.wrapper.wrap(&self.options.executable, args.to_argv())?;
        let command = CommandSpec {
            program,
            args: argv,
            env: HashMap::new(),
            working_dir: None,
            output: OutputMode::Discard,
        };

        process_debug!(ProcessId::current(), "🔧 Launching {}: {}", name, command.display());
        let pid = self.spawner.spawn(&command).await.map_err(|e| {
            process_error!(ProcessId::current(), "❌ Failed to launch {}: {}", name, e);
            e
        })?;

        let supervisor_pid = match &self.options.crash_monitor {
            Some(monitor) => Some(self.attach_crash_monitor(pid, &monitor.binary, monitor.args(pid, &dirs.root)).await?),
            None => None,
        };

        let mut info = InstanceInfo::new(
            request.role,
            request.index,
            request.host,
            request.address,
            port,
            endpoint,
            dirs.root,
            args,
            self.snapshot(),
        );
        info.confirm_pid(pid);
        info.supervisor_pid = supervisor_pid;

        process_info!(ProcessId::current(), "🚀 Started {} (PID: {}) on {}", info.name, pid, info.endpoint);
        Ok(info)
    }

    /// Terminate one instance and its crash monitor
    pub async fn terminate(&self, instance: &InstanceInfo) -> OrchestratorResult<TerminationOutcome> {
        let pid = instance.pid().ok_or(OrchestratorError::NotLaunched)?;
        let outcome = self.spawner.terminate(pid, self.options.shutdown_grace).await?;

        if let Some(supervisor) = instance.supervisor_pid {
            if let Err(e) = self.spawner.terminate(supervisor, self.options.shutdown_grace).await {
                process_warn!(ProcessId::current(), "⚠️ Failed to stop crash monitor {} of {}: {}", supervisor, instance.name, e);
            }
        }

        Ok(outcome)
    }

    /// Best-effort termination of already started instances, newest first
    pub async fn rollback(&self, instances: &[InstanceInfo]) {
        for instance in instances.iter().rev() {
            match self.terminate(instance).await {
                Ok(outcome) => {
                    process_debug!(ProcessId::current(), "↩️ Rolled back {} ({:?})", instance.name, outcome);
                }
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Failed to roll back {}: {}", instance.name, e);
                }
            }
        }
    }

    fn role_defaults(&self, endpoint: &str, dirs: &InstanceDirs) -> OrchestratorResult<LaunchArgs> {
        let level = if self.options.verbose { "info" } else { "error" };
        LaunchArgs::new()
            .with(ConfigKey::ServerEndpoint, endpoint)?
            .with(ConfigKey::DatabaseDirectory, dirs.data.to_string_lossy())?
            .with(ConfigKey::LogFile, dirs.log_file.to_string_lossy())?
            .with(ConfigKey::LogLevel, level)?
            .with(ConfigKey::LogForceDirect, "true")?
            .with(ConfigKey::TempPath, dirs.tmp.to_string_lossy())?
            .with(ConfigKey::AppPath, dirs.apps.to_string_lossy())
    }

    async fn attach_crash_monitor(&self, pid: u32, binary: &Path, args: Vec<String>) -> OrchestratorResult<u32> {
        let command = CommandSpec::new(binary, args);
        match self.spawner.spawn(&command).await {
            Ok(supervisor) => {
                process_debug!(ProcessId::current(), "🛡️ Crash monitor {} attached to {}", supervisor, pid);
                Ok(supervisor)
            }
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Crash monitor failed for {}, killing the instance: {}", pid, e);
                if let Err(kill_err) = self.spawner.terminate(pid, self.options.shutdown_grace).await {
                    process_warn!(ProcessId::current(), "⚠️ Failed to stop unsupervised instance {}: {}", pid, kill_err);
                }
                Err(OrchestratorError::SupervisorFailed {
                    pid,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn snapshot(&self) -> LaunchSnapshot {
        LaunchSnapshot {
            protocol: self.options.protocol,
            verbose: self.options.verbose,
            wrapper: self.options.wrapper.name().to_string(),
            crash_monitor: self.options.crash_monitor.is_some(),
        }
    }
}
