//! Live status over HTTP
//!
//! Asks the first coordinator for the cluster health report. Deployments
//! without coordinators are probed instance by instance.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use shared::{process_debug, ProcessId, Role};

use crate::core::{LiveStatus, MissingInstance, RunRecord};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::LiveStatusSource;

const HEALTH_PATH: &str = "/_admin/cluster/health";
const VERSION_PATH: &str = "/_api/version";

/// One server as listed in the cluster health report
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealth {
    #[serde(rename = "Role")]
    pub role: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Endpoint")]
    pub endpoint: Option<String>,
}

/// Body of the cluster health report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterHealth {
    #[serde(rename = "Health", default)]
    pub health: HashMap<String, ServerHealth>,
}

impl ClusterHealth {
    /// Map the report onto the launched instances
    ///
    /// `FAILED` servers are unreachable, primaries reporting `GOOD` are
    /// serving, and planned data servers or coordinators the report does not
    /// mention are missing.
    pub fn to_live_status(&self, record: &RunRecord) -> LiveStatus {
        let mut live = LiveStatus::default();
        let mut seen = HashSet::new();

        for server in self.health.values() {
            let Some(instance) = server.endpoint.as_deref().and_then(|e| record.instance_by_endpoint(e)) else {
                continue;
            };
            seen.insert(instance.name.clone());

            match server.status.as_deref() {
                Some("FAILED") => {
                    live.unreachable.insert(instance.name.clone());
                }
                Some("GOOD") if instance.role.is_primary() => {
                    live.serving.insert(instance.name.clone());
                }
                _ => {}
            }
        }

        for placement in &record.plan.placements {
            let id = placement.instance_id();
            let launched = record.instance(&id).is_some();
            let reported = placement.role == Role::Agent || seen.contains(&id);
            if !launched || !reported {
                live.missing.push(MissingInstance {
                    id,
                    role: placement.role,
                });
            }
        }

        live
    }
}

/// [`LiveStatusSource`] talking to the launched servers over HTTP
pub struct HttpStatusSource {
    client: reqwest::Client,
}

impl HttpStatusSource {
    pub fn new(timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    async fn from_coordinator(&self, url: &str, record: &RunRecord) -> OrchestratorResult<LiveStatus> {
        let response = self.client.get(format!("{url}{HEALTH_PATH}")).send().await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::StatusUnavailable {
                message: format!("{url}{HEALTH_PATH} answered {}", response.status()),
            });
        }
        let report: ClusterHealth = response.json().await?;
        Ok(report.to_live_status(record))
    }

    async fn from_probes(&self, record: &RunRecord) -> LiveStatus {
        let mut live = LiveStatus::default();

        for instance in &record.instances {
            let answered = match self.client.get(format!("{}{VERSION_PATH}", instance.url)).send().await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    process_debug!(ProcessId::current(), "🔍 {} not answering: {}", instance.name, e);
                    false
                }
            };

            if !answered {
                live.unreachable.insert(instance.name.clone());
            } else if instance.role.is_primary() {
                live.serving.insert(instance.name.clone());
            }
        }

        for placement in &record.plan.placements {
            let id = placement.instance_id();
            if record.instance(&id).is_none() {
                live.missing.push(MissingInstance {
                    id,
                    role: placement.role,
                });
            }
        }

        live
    }
}

#[async_trait]
impl LiveStatusSource for HttpStatusSource {
    async fn fetch(&self, record: &RunRecord) -> OrchestratorResult<LiveStatus> {
        match record.instances_of(Role::Coordinator).next() {
            Some(coordinator) => self.from_coordinator(&coordinator.url, record).await,
            None => Ok(self.from_probes(record).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchArgs;
    use crate::core::{HostId, InstanceInfo, LaunchSnapshot, TopologyPlanner};
    use shared::Protocol;
    use std::path::PathBuf;

    fn record() -> RunRecord {
        let plan = TopologyPlanner::new().with_agency_size(1).plan_single_host("127.0.0.1", 1, 2).unwrap();
        let mut record = RunRecord::new(plan.clone(), PathBuf::from("/tmp/run"));
        for (offset, placement) in plan.placements.iter().enumerate() {
            let port = 4000 + offset as u16;
            record.instances.push(InstanceInfo::new(
                placement.role,
                placement.index,
                HostId(0),
                "127.0.0.1".to_string(),
                port,
                format!("tcp://127.0.0.1:{port}"),
                PathBuf::from("/tmp/run").join(placement.instance_id()),
                LaunchArgs::new(),
                LaunchSnapshot {
                    protocol: Protocol::Tcp,
                    verbose: false,
                    wrapper: "none".to_string(),
                    crash_monitor: false,
                },
            ));
        }
        record
    }

    #[test]
    fn test_report_maps_onto_instances() {
        // agent0=4000 dbserver0=4001 dbserver1=4002 coordinator0=4003
        let body = r#"{
            "Health": {
                "PRMR-1": {"Role": "DBServer", "Status": "GOOD", "Endpoint": "tcp://127.0.0.1:4001"},
                "PRMR-2": {"Role": "DBServer", "Status": "FAILED", "Endpoint": "tcp://127.0.0.1:4002"},
                "CRDN-1": {"Role": "Coordinator", "Status": "GOOD", "Endpoint": "tcp://127.0.0.1:4003"},
                "PRMR-9": {"Role": "DBServer", "Status": "GOOD", "Endpoint": "tcp://127.0.0.1:9999"}
            },
            "ClusterId": "abc",
            "error": false,
            "code": 200
        }"#;
        let report: ClusterHealth = serde_json::from_str(body).unwrap();
        let live = report.to_live_status(&record());

        assert!(live.serving.contains("dbserver0"));
        assert!(live.unreachable.contains("dbserver1"));
        assert!(!live.serving.contains("coordinator0"));
        assert!(live.missing.is_empty());
    }

    #[test]
    fn test_unreported_servers_are_missing() {
        let body = r#"{"Health": {"CRDN-1": {"Role": "Coordinator", "Status": "GOOD", "Endpoint": "tcp://127.0.0.1:4003"}}}"#;
        let report: ClusterHealth = serde_json::from_str(body).unwrap();
        let live = report.to_live_status(&record());

        let missing: Vec<_> = live.missing.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(missing, vec!["dbserver0", "dbserver1"]);
    }

    #[tokio::test]
    async fn test_probe_without_coordinators_marks_silent_instances_unreachable() {
        let plan = TopologyPlanner::new().with_agency_size(1).plan_single_host("127.0.0.1", 0, 0).unwrap();
        let mut rec = RunRecord::new(plan, PathBuf::from("/tmp/run"));
        let mut agent = record().instances[0].clone();
        // nothing listens on port 1
        agent.url = "http://127.0.0.1:1".to_string();
        rec.instances.push(agent);

        let source = HttpStatusSource::new(Duration::from_millis(500)).unwrap();
        let live = source.fetch(&rec).await.unwrap();
        assert!(live.unreachable.contains("agent0"));
        assert!(live.missing.is_empty());
    }
}
