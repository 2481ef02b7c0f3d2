//! Suite Configuration Builder
//!
//! Provides a flexible builder pattern for constructing suite configurations

use super::SuiteConfig;
use orchestrator::{HostSpec, LaunchArgs};
use shared::Protocol;
use std::path::PathBuf;
use std::time::Duration;

pub struct SuiteConfigBuilder {
    config: SuiteConfig,
}

impl SuiteConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SuiteConfig::default(),
        }
    }

    /// Set the server executable launched for every instance
    pub fn executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.executable = path.into();
        self
    }

    /// Set the test binary and its arguments
    pub fn test_binary<P: Into<PathBuf>>(mut self, path: P, args: Vec<String>) -> Self {
        self.config.test_binary = path.into();
        self.config.test_args = args;
        self
    }

    /// Set number of query routers
    pub fn coordinators(mut self, count: u32) -> Self {
        self.config.coordinators = count;
        self
    }

    /// Set number of data servers
    pub fn dbservers(mut self, count: u32) -> Self {
        self.config.dbservers = count;
        self
    }

    /// Set quorum size
    pub fn agency_size(mut self, count: u32) -> Self {
        self.config.agency_size = count;
        self
    }

    /// Add a permitted host
    pub fn host(mut self, host: HostSpec) -> Self {
        self.config.hosts.push(host);
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the directory runs are created under
    pub fn base_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    /// Set arguments passed to every instance
    pub fn extra_args(mut self, args: LaunchArgs) -> Self {
        self.config.extra_args = args;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Echo test output while it streams
    pub fn echo(mut self, echo: bool) -> Self {
        self.config.echo = echo;
        self
    }

    /// Keep the run directory after the suite
    pub fn keep_data(mut self, keep: bool) -> Self {
        self.config.keep_data = keep;
        self
    }

    /// Set health polling interval and bound
    pub fn health_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.config.health_interval = interval;
        self.config.health_attempts = attempts;
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> SuiteConfig {
        self.config
    }
}

impl Default for SuiteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
