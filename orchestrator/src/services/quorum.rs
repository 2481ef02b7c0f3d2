//! Coordination quorum bootstrap
//!
//! Agents `0..n-1` start passively with only their own identity. The last
//! agent is handed every member's endpoint (its own included) and told to
//! notify its peers, which forms the quorum without a discovery service.

use std::path::Path;

use shared::{process_info, ProcessId, Role};

use crate::config::{ConfigKey, LaunchArgs};
use crate::core::{InstanceInfo, Plan, RunRecord};
use crate::error::OrchestratorResult;
use crate::services::launcher::{LaunchRequest, ProcessLauncher};
use crate::traits::ProcessSpawner;

pub struct QuorumBootstrapper<'a, S: ProcessSpawner> {
    launcher: &'a ProcessLauncher<S>,
}

impl<'a, S: ProcessSpawner> QuorumBootstrapper<'a, S> {
    pub fn new(launcher: &'a ProcessLauncher<S>) -> Self {
        Self { launcher }
    }

    /// Launch every planned agent and return a record holding them
    ///
    /// The record's endpoint is the last agent's. Agents started before a
    /// failure are terminated before the error is returned.
    pub async fn bootstrap(&self, plan: &Plan, run_root: &Path) -> OrchestratorResult<RunRecord> {
        let mut record = RunRecord::new(plan.clone(), run_root.to_path_buf());

        match self.launch_members(plan, run_root, &mut record.instances).await {
            Ok(()) => {
                if let Some(last) = record.instances.last() {
                    record.endpoint = last.endpoint.clone();
                    process_info!(ProcessId::current(), "🗳️ Agency of {} up, endpoint {}", record.instances.len(), record.endpoint);
                }
                Ok(record)
            }
            Err(e) => {
                self.launcher.rollback(&record.instances).await;
                Err(e)
            }
        }
    }

    async fn launch_members(&self, plan: &Plan, run_root: &Path, launched: &mut Vec<InstanceInfo>) -> OrchestratorResult<()> {
        let options = self.launcher.options();
        let members: Vec<_> = plan.placements_for(Role::Agent).collect();
        let size = members.len();

        for (i, placement) in members.into_iter().enumerate() {
            let request = LaunchRequest::for_placement(plan, placement, run_root)?;
            let (_, endpoint) = self.launcher.allocate_endpoint(&request.address).await?;

            let mut args = LaunchArgs::new()
                .with(ConfigKey::AgencyActivate, "true")?
                .with(ConfigKey::AgencyId, i.to_string())?
                .with(ConfigKey::AgencySize, size.to_string())?
                .with(ConfigKey::AgencyPoolSize, size.to_string())?
                .with(ConfigKey::AgencyWaitForSync, options.agency_wait_for_sync.to_string())?
                .with(ConfigKey::AgencySupervision, options.agency_supervision.to_string())?
                .with(ConfigKey::ServerEndpoint, endpoint.clone())?
                .with(ConfigKey::AgencyMyAddress, endpoint.clone())?;

            if i + 1 == size {
                for peer in launched.iter() {
                    args.push(ConfigKey::AgencyEndpoint, peer.endpoint.clone())?;
                }
                args.push(ConfigKey::AgencyEndpoint, endpoint)?;
                args.set(ConfigKey::AgencyNotify, "true")?;
            }

            let instance = self.launcher.launch(request.with_overrides(args)).await?;
            launched.push(instance);
        }

        Ok(())
    }
}
