//! Health reconciliation
//!
//! Merges the expected topology with a live status view into one entry per
//! instance. Pure: nothing here touches the network or the run record.

use serde::{Deserialize, Serialize};
use shared::Role;
use std::collections::HashSet;

use crate::core::planner::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
    Missing,
}

/// Health of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    pub id: String,
    pub role: Role,
    pub status: HealthStatus,
}

/// Instance reported by the live view as planned but absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInstance {
    pub id: String,
    pub role: Role,
}

/// Snapshot of the coordination store's view of the deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    /// Instances without a heartbeat
    pub unreachable: HashSet<String>,
    /// Primary data holders that are serving
    pub serving: HashSet<String>,
    /// Plan/live diff
    pub missing: Vec<MissingInstance>,
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// One entry per planned instance, followed by missing entries the plan
    /// does not mention
    ///
    /// Per entry, first match wins: missing, unreachable, primary not yet
    /// serving, otherwise good.
    pub fn check(plan: &Plan, live: &LiveStatus) -> Vec<HealthEntry> {
        let missing: HashSet<&str> = live.missing.iter().map(|m| m.id.as_str()).collect();

        let mut entries: Vec<HealthEntry> = plan
            .placements
            .iter()
            .map(|placement| {
                let id = placement.instance_id();
                let status = Self::classify(&id, placement.role, &missing, live);
                HealthEntry {
                    id,
                    role: placement.role,
                    status,
                }
            })
            .collect();

        for absent in &live.missing {
            if !entries.iter().any(|entry| entry.id == absent.id) {
                entries.push(HealthEntry {
                    id: absent.id.clone(),
                    role: absent.role,
                    status: HealthStatus::Missing,
                });
            }
        }

        entries
    }

    /// True when every entry is `Good`
    pub fn all_good(entries: &[HealthEntry]) -> bool {
        entries.iter().all(|entry| entry.status == HealthStatus::Good)
    }

    fn classify(id: &str, role: Role, missing: &HashSet<&str>, live: &LiveStatus) -> HealthStatus {
        if missing.contains(id) {
            HealthStatus::Missing
        } else if live.unreachable.contains(id) {
            HealthStatus::Critical
        } else if role.is_primary() && !live.serving.contains(id) {
            HealthStatus::Warning
        } else {
            HealthStatus::Good
        }
    }
}
