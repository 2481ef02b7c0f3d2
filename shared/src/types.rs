//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::errors::{SharedError, SharedResult};

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Reported until a binary sets its identity
static DEFAULT_PROCESS_ID: ProcessId = ProcessId::Orchestrator;

/// Identity of the process emitting log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Cluster orchestrator binary (also the default for library callers)
    Orchestrator,
    /// Test-runner binary driving third-party test suites
    Tester,
}

impl ProcessId {
    /// Initialize the global process ID for the orchestrator
    pub fn init_orchestrator() -> &'static ProcessId {
        Self::init(ProcessId::Orchestrator)
    }

    /// Initialize the global process ID for the tester
    pub fn init_tester() -> &'static ProcessId {
        Self::init(ProcessId::Tester)
    }

    /// Get the global process ID without fixing it
    ///
    /// Library callers that never initialise one log as `Orchestrator`.
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&DEFAULT_PROCESS_ID)
    }

    /// Returns the identity actually in effect, which differs from `id`
    /// when an earlier init already set one
    fn init(id: ProcessId) -> &'static ProcessId {
        let current = PROCESS_ID.get_or_init(|| id);
        if *current != id {
            tracing::warn!(process = %current, requested = %id, "Process ID already set; keeping {}", current);
        }
        current
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Orchestrator => write!(f, "orchestrator"),
            ProcessId::Tester => write!(f, "tester"),
        }
    }
}

/// Role an instance plays inside a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Member of the coordination-store quorum
    Agent,
    /// Primary data-holding server
    DbServer,
    /// Stateless query router
    Coordinator,
}

impl Role {
    /// Launch order: the quorum first, then data holders, then routers
    pub const LAUNCH_ORDER: [Role; 3] = [Role::Agent, Role::DbServer, Role::Coordinator];

    /// Value passed as `cluster.my-role`; agents do not join the cluster as members
    pub fn cluster_role(&self) -> Option<&'static str> {
        match self {
            Role::Agent => None,
            Role::DbServer => Some("PRIMARY"),
            Role::Coordinator => Some("COORDINATOR"),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Role::DbServer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Agent => write!(f, "agent"),
            Role::DbServer => write!(f, "dbserver"),
            Role::Coordinator => write!(f, "coordinator"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" | "agency" => Ok(Role::Agent),
            "dbserver" | "primary" => Ok(Role::DbServer),
            "coordinator" => Ok(Role::Coordinator),
            _ => Err(SharedError::InvalidRole { input: s.to_string() }),
        }
    }
}

/// Transport used by launched instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Ssl,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Ssl => write!(f, "ssl"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" | "http" => Ok(Protocol::Tcp),
            "ssl" | "https" => Ok(Protocol::Ssl),
            _ => Err(SharedError::InvalidProtocol { input: s.to_string() }),
        }
    }
}

/// Build an endpoint string such as `tcp://127.0.0.1:8529`
pub fn make_endpoint(protocol: Protocol, address: &str, port: u16) -> String {
    format!("{protocol}://{address}:{port}")
}

/// Translate a server endpoint into the URL HTTP clients should use
///
/// `ssl://` becomes `https://`, every other scheme becomes `http://` and a
/// bare `host:port` is prefixed with `http://`.
pub fn endpoint_to_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("ssl://") {
        return format!("https://{rest}");
    }

    match endpoint.find("://") {
        Some(pos) => format!("http{}", &endpoint[pos..]),
        None => format!("http://{endpoint}"),
    }
}

/// Extract the port of an endpoint, accepting both `scheme://host:port` and `host:port`
pub fn endpoint_port(endpoint: &str) -> SharedResult<u16> {
    let invalid = || SharedError::InvalidEndpoint { endpoint: endpoint.to_string() };

    if endpoint.contains("://") {
        let parsed = Url::parse(endpoint).map_err(|_| invalid())?;
        return parsed.port().ok_or_else(invalid);
    }

    endpoint
        .rsplit(':')
        .next()
        .and_then(|port| port.parse::<u16>().ok())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_to_url() {
        assert_eq!(endpoint_to_url("tcp://127.0.0.1:8529"), "http://127.0.0.1:8529");
        assert_eq!(endpoint_to_url("ssl://127.0.0.1:8529"), "https://127.0.0.1:8529");
        assert_eq!(endpoint_to_url("127.0.0.1:8529"), "http://127.0.0.1:8529");
    }

    #[test]
    fn test_endpoint_port() {
        assert_eq!(endpoint_port("tcp://127.0.0.1:4001").unwrap(), 4001);
        assert_eq!(endpoint_port("ssl://db.local:9443").unwrap(), 9443);
        assert_eq!(endpoint_port("10.0.0.7:5000").unwrap(), 5000);
        assert!(endpoint_port("tcp://127.0.0.1").is_err());
        assert!(endpoint_port("nonsense").is_err());
    }

    #[test]
    fn test_role_round_trip_names() {
        for role in Role::LAUNCH_ORDER {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!("PRIMARY".parse::<Role>().unwrap(), Role::DbServer);
        assert!("router".parse::<Role>().is_err());
    }

    #[test]
    fn test_cluster_roles() {
        assert_eq!(Role::Agent.cluster_role(), None);
        assert_eq!(Role::DbServer.cluster_role(), Some("PRIMARY"));
        assert_eq!(Role::Coordinator.cluster_role(), Some("COORDINATOR"));
        assert!(Role::DbServer.is_primary());
        assert!(!Role::Coordinator.is_primary());
    }

    #[test]
    fn test_process_id_display() {
        assert_eq!(ProcessId::Orchestrator.to_string(), "orchestrator");
        assert_eq!(ProcessId::Tester.to_string(), "tester");
    }

    #[test]
    fn test_current_does_not_fix_identity() {
        // Only this test sets the global identity
        assert_eq!(*ProcessId::current(), ProcessId::Orchestrator);

        assert_eq!(*ProcessId::init_tester(), ProcessId::Tester);
        assert_eq!(*ProcessId::current(), ProcessId::Tester);

        // A second init keeps the first identity
        assert_eq!(*ProcessId::init_orchestrator(), ProcessId::Tester);
        assert_eq!(*ProcessId::current(), ProcessId::Tester);
    }
}
