//! Launch configuration
//!
//! `LaunchArgs` is the argument set handed to a launched instance. Keys the
//! orchestrator understands are enumerated by [`ConfigKey`] and validated the
//! moment they are inserted; anything else is passed through verbatim.
//! `OrchestratorOptions` holds the run-wide settings every launch reads.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use shared::{endpoint_port, Protocol};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Default upper bound for port allocation
pub const DEFAULT_MAX_PORT: u16 = 32768;

const LOG_LEVELS: [&str; 7] = ["fatal", "error", "err", "warning", "warn", "info", "debug"];
const TRACE_LEVEL: &str = "trace";

/// A configuration key understood by launched instances
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ServerEndpoint,
    DatabaseDirectory,
    LogFile,
    LogLevel,
    LogForceDirect,
    TempPath,
    AppPath,
    AgencyActivate,
    AgencyId,
    AgencySize,
    AgencyPoolSize,
    AgencyWaitForSync,
    AgencySupervision,
    AgencyMyAddress,
    AgencyEndpoint,
    AgencyNotify,
    ClusterMyAddress,
    ClusterMyRole,
    ClusterAgencyEndpoint,
    /// Unrecognised key, passed through untouched
    Other(String),
}

/// What a recognised key's value must look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Endpoint,
    Path,
    LogLevel,
    Bool,
    Count,
    Text,
}

impl ConfigKey {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigKey::ServerEndpoint => "server.endpoint",
            ConfigKey::DatabaseDirectory => "database.directory",
            ConfigKey::LogFile => "log.file",
            ConfigKey::LogLevel => "log.level",
            ConfigKey::LogForceDirect => "log.force-direct",
            ConfigKey::TempPath => "temp.path",
            ConfigKey::AppPath => "javascript.app-path",
            ConfigKey::AgencyActivate => "agency.activate",
            ConfigKey::AgencyId => "agency.id",
            ConfigKey::AgencySize => "agency.size",
            ConfigKey::AgencyPoolSize => "agency.pool-size",
            ConfigKey::AgencyWaitForSync => "agency.wait-for-sync",
            ConfigKey::AgencySupervision => "agency.supervision",
            ConfigKey::AgencyMyAddress => "agency.my-address",
            ConfigKey::AgencyEndpoint => "agency.endpoint",
            ConfigKey::AgencyNotify => "agency.notify",
            ConfigKey::ClusterMyAddress => "cluster.my-address",
            ConfigKey::ClusterMyRole => "cluster.my-role",
            ConfigKey::ClusterAgencyEndpoint => "cluster.agency-endpoint",
            ConfigKey::Other(name) => name,
        }
    }

    /// Keys that may appear more than once on a command line
    pub fn is_repeatable(&self) -> bool {
        matches!(self, ConfigKey::AgencyEndpoint)
    }

    fn kind(&self) -> ValueKind {
        match self {
            ConfigKey::ServerEndpoint
            | ConfigKey::AgencyMyAddress
            | ConfigKey::AgencyEndpoint
            | ConfigKey::ClusterMyAddress
            | ConfigKey::ClusterAgencyEndpoint => ValueKind::Endpoint,
            ConfigKey::DatabaseDirectory | ConfigKey::LogFile | ConfigKey::TempPath | ConfigKey::AppPath => {
                ValueKind::Path
            }
            ConfigKey::LogLevel => ValueKind::LogLevel,
            ConfigKey::LogForceDirect
            | ConfigKey::AgencyActivate
            | ConfigKey::AgencyWaitForSync
            | ConfigKey::AgencySupervision
            | ConfigKey::AgencyNotify => ValueKind::Bool,
            ConfigKey::AgencyId | ConfigKey::AgencySize | ConfigKey::AgencyPoolSize => ValueKind::Count,
            ConfigKey::ClusterMyRole | ConfigKey::Other(_) => ValueKind::Text,
        }
    }

    fn validate(&self, value: &str) -> OrchestratorResult<()> {
        let reject = |reason: &str| Err(OrchestratorError::invalid(self.as_str(), value, reason));

        match self.kind() {
            ValueKind::Endpoint => {
                if endpoint_port(value).is_err() {
                    return reject("expected an endpoint with a port");
                }
            }
            ValueKind::Path => {
                if value.trim().is_empty() {
                    return reject("path must not be empty");
                }
            }
            ValueKind::LogLevel => {
                // Either a bare level or a topic=level pair
                let level = value.rsplit('=').next().unwrap_or(value).to_lowercase();
                if level != TRACE_LEVEL && !LOG_LEVELS.contains(&level.as_str()) {
                    return reject("unknown log level");
                }
            }
            ValueKind::Bool => {
                if value != "true" && value != "false" {
                    return reject("expected 'true' or 'false'");
                }
            }
            ValueKind::Count => match value.parse::<u32>() {
                Ok(0) if *self != ConfigKey::AgencyId => return reject("must be at least 1"),
                Ok(_) => {}
                Err(_) => return reject("expected a non-negative integer"),
            },
            ValueKind::Text => {
                if let ConfigKey::Other(name) = self {
                    if name.is_empty() || name.starts_with('-') {
                        return reject("key must be a bare option name");
                    }
                }
            }
        }

        Ok(())
    }
}

impl From<&str> for ConfigKey {
    fn from(key: &str) -> Self {
        match key {
            "server.endpoint" => ConfigKey::ServerEndpoint,
            "database.directory" => ConfigKey::DatabaseDirectory,
            "log.file" => ConfigKey::LogFile,
            "log.level" => ConfigKey::LogLevel,
            "log.force-direct" => ConfigKey::LogForceDirect,
            "temp.path" => ConfigKey::TempPath,
            "javascript.app-path" => ConfigKey::AppPath,
            "agency.activate" => ConfigKey::AgencyActivate,
            "agency.id" => ConfigKey::AgencyId,
            "agency.size" => ConfigKey::AgencySize,
            "agency.pool-size" => ConfigKey::AgencyPoolSize,
            "agency.wait-for-sync" => ConfigKey::AgencyWaitForSync,
            "agency.supervision" => ConfigKey::AgencySupervision,
            "agency.my-address" => ConfigKey::AgencyMyAddress,
            "agency.endpoint" => ConfigKey::AgencyEndpoint,
            "agency.notify" => ConfigKey::AgencyNotify,
            "cluster.my-address" => ConfigKey::ClusterMyAddress,
            "cluster.my-role" => ConfigKey::ClusterMyRole,
            "cluster.agency-endpoint" => ConfigKey::ClusterAgencyEndpoint,
            other => ConfigKey::Other(other.to_string()),
        }
    }
}

impl From<String> for ConfigKey {
    fn from(key: String) -> Self {
        ConfigKey::from(key.as_str())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, validated argument set for one launched process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArgs {
    entries: Vec<(ConfigKey, Vec<String>)>,
}

impl LaunchArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing any previous value(s) but keeping its position
    pub fn set(&mut self, key: impl Into<ConfigKey>, value: impl Into<String>) -> OrchestratorResult<()> {
        let key = key.into();
        let value = value.into();
        key.validate(&value)?;

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => *values = vec![value],
            None => self.entries.push((key, vec![value])),
        }
        Ok(())
    }

    /// Append one more value for a repeatable key
    pub fn push(&mut self, key: impl Into<ConfigKey>, value: impl Into<String>) -> OrchestratorResult<()> {
        let key = key.into();
        let value = value.into();
        if !key.is_repeatable() {
            return Err(OrchestratorError::invalid(key.as_str(), value, "key may only be given once"));
        }
        key.validate(&value)?;

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
        Ok(())
    }

    /// Fluent form of [`LaunchArgs::set`]
    pub fn with(mut self, key: impl Into<ConfigKey>, value: impl Into<String>) -> OrchestratorResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Parse `key=value` assignments such as those given on the command line
    pub fn from_assignments<I, S>(assignments: I) -> OrchestratorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, value) = assignment
                .split_once('=')
                .ok_or_else(|| OrchestratorError::invalid(assignment, "", "expected key=value"))?;
            let key = ConfigKey::from(key.trim().trim_start_matches("--"));
            if key.is_repeatable() {
                args.push(key, value)?;
            } else {
                args.set(key, value)?;
            }
        }
        Ok(args)
    }

    /// Layer `overrides` on top of `self`; overriding keys replace every value
    pub fn merge(&mut self, overrides: &LaunchArgs) {
        for (key, values) in &overrides.entries {
            match self.entries.iter_mut().find(|(existing, _)| existing == key) {
                Some((_, existing)) => *existing = values.clone(),
                None => self.entries.push((key.clone(), values.clone())),
            }
        }
    }

    /// Merge layers in increasing precedence
    pub fn layered(layers: &[&LaunchArgs]) -> LaunchArgs {
        let mut merged = LaunchArgs::new();
        for layer in layers {
            merged.merge(layer);
        }
        merged
    }

    pub fn get(&self, key: &ConfigKey) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &ConfigKey) -> &[String] {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, key: &ConfigKey) -> bool {
        self.entries.iter().any(|(existing, _)| existing == key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConfigKey, &[String])> {
        self.entries.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Render as `--key value` pairs, one flag per value
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        for (key, values) in &self.entries {
            for value in values {
                argv.push(format!("--{key}"));
                argv.push(value.clone());
            }
        }
        argv
    }

    /// Render as `--key=value` tokens, the form diagnostic wrappers expect
    pub fn to_joined_argv(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| format!("--{key}={value}")))
            .collect()
    }
}

impl Serialize for LaunchArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            if key.is_repeatable() {
                map.serialize_entry(key.as_str(), values)?;
            } else {
                map.serialize_entry(key.as_str(), &values[0])?;
            }
        }
        map.end()
    }
}

/// Tool that wraps launched instances for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiagnosticWrapper {
    #[default]
    None,
    /// Memory checker; its own options are rendered as `--key=value`
    Valgrind {
        binary: PathBuf,
        args: LaunchArgs,
        file_base: String,
        xml: bool,
    },
    /// Deterministic replay recorder
    Rr { binary: PathBuf },
}

impl DiagnosticWrapper {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticWrapper::None => "none",
            DiagnosticWrapper::Valgrind { .. } => "valgrind",
            DiagnosticWrapper::Rr { .. } => "rr",
        }
    }

    /// Produce the actual command and argv for launching `command argv`
    pub fn wrap(&self, command: &Path, argv: Vec<String>) -> OrchestratorResult<(PathBuf, Vec<String>)> {
        match self {
            DiagnosticWrapper::None => Ok((command.to_path_buf(), argv)),
            DiagnosticWrapper::Valgrind {
                binary,
                args,
                file_base,
                xml,
            } => {
                let prefix = if file_base.is_empty() {
                    String::new()
                } else {
                    format!("{file_base}_")
                };

                let mut options = args.clone();
                if *xml {
                    options.set("xml", "yes")?;
                    options.set("xml-file", format!("{prefix}.%p.xml"))?;
                }
                options.set("log-file", format!("{prefix}.%p.valgrind.log"))?;

                let mut wrapped = options.to_joined_argv();
                wrapped.push(command.to_string_lossy().into_owned());
                wrapped.extend(argv);
                Ok((binary.clone(), wrapped))
            }
            DiagnosticWrapper::Rr { binary } => {
                let mut wrapped = vec![command.to_string_lossy().into_owned()];
                wrapped.extend(argv);
                Ok((binary.clone(), wrapped))
            }
        }
    }
}

/// Supervisory crash-dump tool attached to every launched instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashMonitor {
    pub binary: PathBuf,
}

impl Default for CrashMonitor {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("procdump"),
        }
    }
}

impl CrashMonitor {
    /// Arguments attaching the monitor to `pid`, writing dumps into `dump_dir`
    pub fn args(&self, pid: u32, dump_dir: &Path) -> Vec<String> {
        vec![
            "-accepteula".to_string(),
            "-e".to_string(),
            "-ma".to_string(),
            pid.to_string(),
            dump_dir.join(format!("core.{pid}.dmp")).to_string_lossy().into_owned(),
        ]
    }
}

/// Run-wide settings shared by every launch
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Server executable launched for every instance
    pub executable: PathBuf,
    /// Directory under which each run creates its own root
    pub base_dir: PathBuf,
    pub protocol: Protocol,
    pub verbose: bool,
    /// Upper bound handed to the port allocator
    pub max_port: Option<u16>,
    /// Lowest-precedence arguments for every instance
    pub base_args: LaunchArgs,
    /// Arguments layered above role defaults for every instance
    pub extra_args: LaunchArgs,
    pub wrapper: DiagnosticWrapper,
    pub crash_monitor: Option<CrashMonitor>,
    pub agency_wait_for_sync: bool,
    pub agency_supervision: bool,
    /// Pause between health polls
    pub health_interval: Duration,
    /// Number of health polls before giving up
    pub health_attempts: u32,
    /// Time an instance gets to exit after SIGTERM
    pub shutdown_grace: Duration,
}

impl OrchestratorOptions {
    pub fn builder() -> OrchestratorOptionsBuilder {
        OrchestratorOptionsBuilder::new()
    }
}

/// Builder validating options before any launch reads them
#[derive(Debug, Clone)]
pub struct OrchestratorOptionsBuilder {
    executable: Option<PathBuf>,
    base_dir: PathBuf,
    protocol: Protocol,
    verbose: bool,
    max_port: Option<u16>,
    base_args: LaunchArgs,
    extra_args: LaunchArgs,
    wrapper: DiagnosticWrapper,
    crash_monitor: Option<CrashMonitor>,
    agency_wait_for_sync: bool,
    agency_supervision: bool,
    health_interval: Duration,
    health_attempts: u32,
    shutdown_grace: Duration,
}

impl OrchestratorOptionsBuilder {
    pub fn new() -> Self {
        Self {
            executable: None,
            base_dir: std::env::temp_dir().join("cluster-orchestrator"),
            protocol: Protocol::Tcp,
            verbose: false,
            max_port: None,
            base_args: LaunchArgs::new(),
            extra_args: LaunchArgs::new(),
            wrapper: DiagnosticWrapper::None,
            crash_monitor: if cfg!(windows) { Some(CrashMonitor::default()) } else { None },
            agency_wait_for_sync: false,
            agency_supervision: true,
            health_interval: Duration::from_millis(500),
            health_attempts: 1200, // 10 minutes at the default interval
            shutdown_grace: Duration::from_secs(60),
        }
    }

    /// Set the server executable (required)
    pub fn executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Set the directory runs are created under
    pub fn base_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Launch instances with `log.level=info` instead of `error`
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn max_port(mut self, max_port: Option<u16>) -> Self {
        self.max_port = max_port;
        self
    }

    pub fn base_args(mut self, args: LaunchArgs) -> Self {
        self.base_args = args;
        self
    }

    pub fn extra_args(mut self, args: LaunchArgs) -> Self {
        self.extra_args = args;
        self
    }

    pub fn wrapper(mut self, wrapper: DiagnosticWrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn crash_monitor(mut self, monitor: Option<CrashMonitor>) -> Self {
        self.crash_monitor = monitor;
        self
    }

    pub fn agency_wait_for_sync(mut self, wait_for_sync: bool) -> Self {
        self.agency_wait_for_sync = wait_for_sync;
        self
    }

    pub fn agency_supervision(mut self, supervision: bool) -> Self {
        self.agency_supervision = supervision;
        self
    }

    pub fn health_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.health_interval = interval;
        self.health_attempts = attempts;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Build the options, failing on missing or contradictory settings
    pub fn build(self) -> OrchestratorResult<OrchestratorOptions> {
        let executable = self.executable.ok_or_else(|| OrchestratorError::config("executable"))?;
        if executable.as_os_str().is_empty() {
            return Err(OrchestratorError::config("executable"));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(OrchestratorError::config("base_dir"));
        }
        if self.health_attempts == 0 {
            return Err(OrchestratorError::invalid("health_attempts", "0", "must be at least 1"));
        }

        Ok(OrchestratorOptions {
            executable,
            base_dir: self.base_dir,
            protocol: self.protocol,
            verbose: self.verbose,
            max_port: self.max_port,
            base_args: self.base_args,
            extra_args: self.extra_args,
            wrapper: self.wrapper,
            crash_monitor: self.crash_monitor,
            agency_wait_for_sync: self.agency_wait_for_sync,
            agency_supervision: self.agency_supervision,
            health_interval: self.health_interval,
            health_attempts: self.health_attempts,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

impl Default for OrchestratorOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_recognised_keys_are_validated() {
        let mut args = LaunchArgs::new();
        assert!(args.set("agency.size", "3").is_ok());
        assert_matches!(args.set("agency.size", "three"), Err(OrchestratorError::InvalidConfig { .. }));
        assert_matches!(args.set("agency.size", "0"), Err(OrchestratorError::InvalidConfig { .. }));
        assert!(args.set("agency.id", "0").is_ok());
        assert_matches!(args.set("log.force-direct", "yes"), Err(OrchestratorError::InvalidConfig { .. }));
        assert_matches!(args.set("server.endpoint", "localhost"), Err(OrchestratorError::InvalidConfig { .. }));
        assert!(args.set("log.level", "requests=debug").is_ok());
        assert_matches!(args.set("log.level", "loud"), Err(OrchestratorError::InvalidConfig { .. }));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let args = LaunchArgs::new().with("http.trusted-origin", "all").unwrap();
        assert_eq!(args.to_argv(), vec!["--http.trusted-origin", "all"]);
    }

    #[test]
    fn test_only_endpoint_lists_repeat() {
        let mut args = LaunchArgs::new();
        args.push("agency.endpoint", "tcp://127.0.0.1:4001").unwrap();
        args.push("agency.endpoint", "tcp://127.0.0.1:4002").unwrap();
        assert_eq!(args.get_all(&ConfigKey::AgencyEndpoint).len(), 2);
        assert!(args.push("log.file", "/tmp/log").is_err());
    }

    #[test]
    fn test_merge_precedence_keeps_position() {
        let defaults = LaunchArgs::new()
            .with("log.level", "error")
            .unwrap()
            .with("database.directory", "/data")
            .unwrap();
        let extra = LaunchArgs::new().with("log.level", "info").unwrap();
        let explicit = LaunchArgs::new().with("log.level", "debug").unwrap();

        let merged = LaunchArgs::layered(&[&defaults, &extra, &explicit]);
        assert_eq!(merged.get(&ConfigKey::LogLevel), Some("debug"));
        assert_eq!(
            merged.to_argv(),
            vec!["--log.level", "debug", "--database.directory", "/data"]
        );
    }

    #[test]
    fn test_from_assignments() {
        let args = LaunchArgs::from_assignments(["--server.storage-engine=rocksdb", "agency.endpoint=tcp://h:1"]).unwrap();
        assert_eq!(args.get(&ConfigKey::Other("server.storage-engine".into())), Some("rocksdb"));
        assert_eq!(args.get_all(&ConfigKey::AgencyEndpoint), ["tcp://h:1".to_string()]);
        assert!(LaunchArgs::from_assignments(["no-equals-sign"]).is_err());
    }

    #[test]
    fn test_valgrind_wrapping() {
        let wrapper = DiagnosticWrapper::Valgrind {
            binary: PathBuf::from("/usr/bin/valgrind"),
            args: LaunchArgs::new().with("leak-check", "full").unwrap(),
            file_base: "agency".to_string(),
            xml: false,
        };
        let (command, argv) = wrapper
            .wrap(Path::new("/opt/db/server"), vec!["--log.level".into(), "info".into()])
            .unwrap();

        assert_eq!(command, PathBuf::from("/usr/bin/valgrind"));
        assert_eq!(
            argv,
            vec![
                "--leak-check=full",
                "--log-file=agency_.%p.valgrind.log",
                "/opt/db/server",
                "--log.level",
                "info"
            ]
        );
    }

    #[test]
    fn test_rr_wrapping_keeps_original_command_first() {
        let wrapper = DiagnosticWrapper::Rr {
            binary: PathBuf::from("rr"),
        };
        let (command, argv) = wrapper.wrap(Path::new("server"), vec!["--x".into(), "1".into()]).unwrap();
        assert_eq!(command, PathBuf::from("rr"));
        assert_eq!(argv, vec!["server", "--x", "1"]);
    }

    #[test]
    fn test_missing_executable_is_fatal() {
        let result = OrchestratorOptions::builder().build();
        assert_matches!(result, Err(OrchestratorError::MissingConfiguration { field }) if field == "executable");
    }

    #[test]
    fn test_launch_args_serialize_as_map() {
        let mut args = LaunchArgs::new().with("agency.size", "3").unwrap();
        args.push("agency.endpoint", "tcp://127.0.0.1:4001").unwrap();
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["agency.size"], "3");
        assert_eq!(json["agency.endpoint"][0], "tcp://127.0.0.1:4001");
    }
}
