//! Orchestrator library for launching multi-role database clusters
//!
//! Plans a deployment (a coordination quorum plus data servers and query
//! routers) over a set of permitted hosts, launches the processes in
//! dependency order, polls until the deployment is healthy, and later shuts
//! it down, removes its on-disk state or relaunches it from the stored plan.

pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{ConfigKey, CrashMonitor, DiagnosticWrapper, LaunchArgs, OrchestratorOptions};
pub use controller::{InstanceShutdown, LifecycleController, ShutdownReport};
pub use core::{
    EventStreamReducer, HealthEntry, HealthMonitor, HealthStatus, HostSpec, InstanceInfo, LifecycleState, LiveStatus,
    Plan, RunRecord, TestEventResult, TestRunSummary, TopologyPlanner,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use services::{HttpStatusSource, PortAllocator, ProcessLauncher, QuorumBootstrapper, SubprocessEventStreamParser, TestRunner, TokioSpawner};
pub use traits::{CommandSpec, LiveStatusSource, OutputMode, ProcessSpawner, TerminationOutcome};
