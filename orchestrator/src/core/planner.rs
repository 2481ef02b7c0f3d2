//! Topology planning
//!
//! Turns role counts plus a list of permitted hosts into a concrete,
//! deterministic placement of every instance.

use serde::{Deserialize, Serialize};
use shared::{process_warn, ProcessId, Role};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Default quorum size
pub const DEFAULT_AGENCY_SIZE: u32 = 3;

/// One permitted deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub address: String,
    pub allows_coordinator: bool,
    pub allows_dbserver: bool,
}

impl HostSpec {
    pub fn new(address: impl Into<String>, allows_coordinator: bool, allows_dbserver: bool) -> Self {
        Self {
            address: address.into(),
            allows_coordinator,
            allows_dbserver,
        }
    }

    /// A host accepting every role
    pub fn any_role(address: impl Into<String>) -> Self {
        Self::new(address, true, true)
    }

    pub fn allows(&self, role: Role) -> bool {
        match role {
            Role::Agent => true,
            Role::DbServer => self.allows_dbserver,
            Role::Coordinator => self.allows_coordinator,
        }
    }
}

impl std::str::FromStr for HostSpec {
    type Err = OrchestratorError;

    /// Parses `address[/roles]` where roles is any combination of `c` and `d`,
    /// e.g. `10.0.0.5/cd`, `10.0.0.6/d`. No suffix permits every role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, roles) = match s.rsplit_once('/') {
            Some((address, roles)) => (address, Some(roles)),
            None => (s, None),
        };
        if address.trim().is_empty() {
            return Err(OrchestratorError::invalid("host", s, "address must not be empty"));
        }

        match roles {
            None => Ok(HostSpec::any_role(address)),
            Some(roles) => {
                if roles.is_empty() || roles.chars().any(|c| c != 'c' && c != 'd') {
                    return Err(OrchestratorError::invalid("host", s, "roles must be a combination of 'c' and 'd'"));
                }
                Ok(HostSpec::new(address, roles.contains('c'), roles.contains('d')))
            }
        }
    }
}

/// Synthetic identifier of a host within one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub u32);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

/// Assignment of one role instance to a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub role: Role,
    pub index: u32,
    pub host: HostId,
}

impl Placement {
    /// Stable instance name, e.g. `dbserver1`
    pub fn instance_id(&self) -> String {
        format!("{}{}", self.role, self.index)
    }
}

/// Concrete topology derived from a role-count request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub hosts: BTreeMap<HostId, HostSpec>,
    pub agents: u32,
    pub coordinators: u32,
    pub dbservers: u32,
    /// Ordered agents first, then data servers, then coordinators
    pub placements: Vec<Placement>,
}

impl Plan {
    pub fn host(&self, id: HostId) -> Option<&HostSpec> {
        self.hosts.get(&id)
    }

    pub fn placements_for(&self, role: Role) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(move |placement| placement.role == role)
    }

    pub fn count(&self, role: Role) -> u32 {
        match role {
            Role::Agent => self.agents,
            Role::DbServer => self.dbservers,
            Role::Coordinator => self.coordinators,
        }
    }
}

/// Places role instances onto permitted hosts
#[derive(Debug, Clone)]
pub struct TopologyPlanner {
    agency_size: u32,
}

impl TopologyPlanner {
    pub fn new() -> Self {
        Self {
            agency_size: DEFAULT_AGENCY_SIZE,
        }
    }

    /// Set the quorum size (odd sizes are recommended)
    pub fn with_agency_size(mut self, size: u32) -> Self {
        self.agency_size = size;
        self
    }

    /// Plan `coordinators` routers and `dbservers` data holders on `hosts`
    ///
    /// Each unit of a role goes to the next host in input order that permits
    /// it. Fails when a role asks for more instances than there are hosts
    /// permitting it.
    pub fn plan(&self, coordinators: u32, dbservers: u32, hosts: &[HostSpec]) -> OrchestratorResult<Plan> {
        if self.agency_size == 0 {
            return Err(OrchestratorError::invalid("agency.size", "0", "a deployment needs at least one agent"));
        }
        if self.agency_size % 2 == 0 {
            process_warn!(
                ProcessId::current(),
                "⚠️ Agency size {} is even; an odd quorum tolerates the same failures with fewer members",
                self.agency_size
            );
        }

        let hosts: BTreeMap<HostId, HostSpec> = hosts
            .iter()
            .enumerate()
            .map(|(i, spec)| (HostId(i as u32), spec.clone()))
            .collect();

        let mut placements = Vec::new();
        for (role, requested) in [
            (Role::Agent, self.agency_size),
            (Role::DbServer, dbservers),
            (Role::Coordinator, coordinators),
        ] {
            placements.extend(Self::place_role(&hosts, role, requested)?);
        }

        Ok(Plan {
            hosts,
            agents: self.agency_size,
            coordinators,
            dbservers,
            placements,
        })
    }

    /// Single-host shape: one address accepting every role
    ///
    /// Expands to as many identical host entries as the largest role count so
    /// the general placement rule applies unchanged.
    pub fn plan_single_host(&self, address: &str, coordinators: u32, dbservers: u32) -> OrchestratorResult<Plan> {
        let width = coordinators.max(dbservers).max(1);
        let hosts: Vec<HostSpec> = (0..width).map(|_| HostSpec::any_role(address)).collect();
        self.plan(coordinators, dbservers, &hosts)
    }

    fn place_role(hosts: &BTreeMap<HostId, HostSpec>, role: Role, requested: u32) -> OrchestratorResult<Vec<Placement>> {
        let permitted: Vec<HostId> = hosts
            .iter()
            .filter(|(_, spec)| spec.allows(role))
            .map(|(id, _)| *id)
            .collect();

        // Agents may share hosts; the other roles get one host each
        let fits = match role {
            Role::Agent => requested == 0 || !permitted.is_empty(),
            _ => requested as usize <= permitted.len(),
        };
        if !fits {
            return Err(OrchestratorError::Placement {
                role,
                requested: requested as usize,
                available: permitted.len(),
            });
        }

        Ok((0..requested)
            .map(|index| Placement {
                role,
                index,
                host: permitted[index as usize % permitted.len()],
            })
            .collect())
    }
}

impl Default for TopologyPlanner {
    fn default() -> Self {
        Self::new()
    }
}
