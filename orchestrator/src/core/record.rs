//! Run records
//!
//! `InstanceInfo` describes one launched process; `RunRecord` ties a plan
//! to the instances launched from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{Protocol, Role};
use std::path::PathBuf;

use crate::config::LaunchArgs;
use crate::core::lifecycle::LifecycleState;
use crate::core::planner::{HostId, Plan};

/// Options in effect when an instance was launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSnapshot {
    pub protocol: Protocol,
    pub verbose: bool,
    pub wrapper: String,
    pub crash_monitor: bool,
}

/// One launched (or previously launched) process
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    /// Stable name such as `agent0` or `coordinator1`
    pub name: String,
    pub role: Role,
    pub index: u32,
    pub host: HostId,
    pub address: String,
    pub port: u16,
    pub endpoint: String,
    pub url: String,
    pub root_dir: PathBuf,
    pub data_dir: PathBuf,
    pub app_dir: PathBuf,
    pub log_file: PathBuf,
    /// Exact argument set the instance was launched with
    pub args: LaunchArgs,
    pub options: LaunchSnapshot,
    pub supervisor_pid: Option<u32>,
    pid: Option<u32>,
}

impl InstanceInfo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        role: Role,
        index: u32,
        host: HostId,
        address: String,
        port: u16,
        endpoint: String,
        root_dir: PathBuf,
        args: LaunchArgs,
        options: LaunchSnapshot,
    ) -> Self {
        Self {
            name: format!("{role}{index}"),
            role,
            index,
            host,
            address,
            port,
            url: shared::endpoint_to_url(&endpoint),
            endpoint,
            data_dir: root_dir.join("data"),
            app_dir: root_dir.join("apps"),
            log_file: root_dir.join("log"),
            root_dir,
            args,
            options,
            supervisor_pid: None,
            pid: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Record the OS process id; only the first confirmation sticks
    pub(crate) fn confirm_pid(&mut self, pid: u32) {
        if self.pid.is_none() {
            self.pid = Some(pid);
        }
    }
}

/// Live record of one orchestrated deployment
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub plan: Plan,
    pub run_root: PathBuf,
    pub instances: Vec<InstanceInfo>,
    /// Entry point for health checks and clients
    pub endpoint: String,
    pub state: LifecycleState,
    pub launched_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(plan: Plan, run_root: PathBuf) -> Self {
        Self {
            plan,
            run_root,
            instances: Vec::new(),
            endpoint: String::new(),
            state: LifecycleState::Planned,
            launched_at: Utc::now(),
        }
    }

    pub fn url(&self) -> String {
        shared::endpoint_to_url(&self.endpoint)
    }

    pub fn instances_of(&self, role: Role) -> impl Iterator<Item = &InstanceInfo> {
        self.instances.iter().filter(move |instance| instance.role == role)
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceInfo> {
        self.instances.iter().find(|instance| instance.name == name)
    }

    /// Instance whose endpoint matches, ignoring the scheme
    pub fn instance_by_endpoint(&self, endpoint: &str) -> Option<&InstanceInfo> {
        let strip = |e: &str| e.split_once("://").map(|(_, rest)| rest.to_string()).unwrap_or_else(|| e.to_string());
        let wanted = strip(endpoint);
        self.instances.iter().find(|instance| strip(&instance.endpoint) == wanted)
    }
}
