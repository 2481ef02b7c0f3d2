//! Suite Configuration
//!
//! Everything needed to bring up a cluster and point a test binary at it

use std::path::PathBuf;
use std::time::Duration;

use orchestrator::{CommandSpec, HostSpec, LaunchArgs, OrchestratorOptions, OrchestratorResult, Plan, TopologyPlanner};
use shared::Protocol;

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Server executable for every instance
    pub executable: PathBuf,
    /// Test binary emitting a JSON event stream on stdout
    pub test_binary: PathBuf,
    pub test_args: Vec<String>,
    pub coordinators: u32,
    pub dbservers: u32,
    pub agency_size: u32,
    /// Permitted hosts; empty means everything on `127.0.0.1`
    pub hosts: Vec<HostSpec>,
    pub protocol: Protocol,
    pub base_dir: Option<PathBuf>,
    pub extra_args: LaunchArgs,
    pub verbose: bool,
    /// Echo test output through the log while it streams
    pub echo: bool,
    /// Leave the run directory behind for inspection
    pub keep_data: bool,
    pub health_interval: Duration,
    pub health_attempts: u32,
    pub log_level: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            test_binary: PathBuf::new(),
            test_args: Vec::new(),
            coordinators: 1,
            dbservers: 2,
            agency_size: orchestrator::core::DEFAULT_AGENCY_SIZE,
            hosts: Vec::new(),
            protocol: Protocol::Tcp,
            base_dir: None,
            extra_args: LaunchArgs::new(),
            verbose: false,
            echo: true,
            keep_data: false,
            health_interval: Duration::from_millis(500),
            health_attempts: 240, // two minutes at the default interval
            log_level: "info".to_string(),
        }
    }
}

impl SuiteConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::SuiteConfigBuilder {
        crate::config::builder::SuiteConfigBuilder::new()
    }

    /// Orchestrator options for this suite, validated
    pub fn options(&self) -> OrchestratorResult<OrchestratorOptions> {
        let mut builder = OrchestratorOptions::builder()
            .executable(&self.executable)
            .protocol(self.protocol)
            .verbose(self.verbose)
            .extra_args(self.extra_args.clone())
            .health_polling(self.health_interval, self.health_attempts);
        if let Some(dir) = &self.base_dir {
            builder = builder.base_dir(dir);
        }
        builder.build()
    }

    /// Topology requested by this suite
    pub fn plan(&self) -> OrchestratorResult<Plan> {
        let planner = TopologyPlanner::new().with_agency_size(self.agency_size);
        if self.hosts.is_empty() {
            planner.plan_single_host("127.0.0.1", self.coordinators, self.dbservers)
        } else {
            planner.plan(self.coordinators, self.dbservers, &self.hosts)
        }
    }

    /// Command line of the test binary
    pub fn test_command(&self) -> CommandSpec {
        CommandSpec::new(&self.test_binary, self.test_args.clone())
    }

    /// Check the settings that options validation does not cover
    pub fn is_valid(&self) -> bool {
        !self.test_binary.as_os_str().is_empty() && self.agency_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use orchestrator::OrchestratorError;
    use shared::Role;

    #[test]
    fn test_default_topology() {
        let config = SuiteConfig {
            executable: PathBuf::from("/opt/db/bin/server"),
            test_binary: PathBuf::from("/opt/tests/suite"),
            ..SuiteConfig::default()
        };

        let plan = config.plan().unwrap();
        assert_eq!(plan.count(Role::Agent), 3);
        assert_eq!(plan.count(Role::DbServer), 2);
        assert_eq!(plan.count(Role::Coordinator), 1);
        assert!(config.is_valid());
        assert!(config.echo);
        assert_eq!(config.options().unwrap().health_attempts, 240);
    }

    #[test]
    fn test_missing_executable_is_reported() {
        let config = SuiteConfig::default();
        assert_matches!(config.options(), Err(OrchestratorError::MissingConfiguration { .. }));
        assert!(!config.is_valid());
    }
}
