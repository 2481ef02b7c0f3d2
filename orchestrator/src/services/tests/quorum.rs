//! Tests for QuorumBootstrapper

use assert_matches::assert_matches;
use mockall::predicate::{always, eq};
use std::sync::Arc;

use shared::Role;

use super::common::{any_port, flag_values, options, recording_spawner};
use crate::config::ConfigKey;
use crate::core::{LifecycleState, TopologyPlanner};
use crate::error::OrchestratorError;
use crate::services::launcher::ProcessLauncher;
use crate::services::quorum::QuorumBootstrapper;
use crate::traits::{MockProcessSpawner, TerminationOutcome};

#[tokio::test]
async fn test_three_member_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let plan = TopologyPlanner::new().with_agency_size(3).plan_single_host("127.0.0.1", 0, 0).unwrap();
    let (spawner, spawned) = recording_spawner(100);
    let launcher = ProcessLauncher::new(Arc::new(spawner), options(dir.path())).with_ports(any_port());

    let record = QuorumBootstrapper::new(&launcher).bootstrap(&plan, dir.path()).await.unwrap();

    assert_eq!(record.instances.len(), 3);
    assert_eq!(record.state, LifecycleState::Planned);
    assert_eq!(record.endpoint, record.instances[2].endpoint);

    for (i, agent) in record.instances.iter().enumerate() {
        assert_eq!(agent.role, Role::Agent);
        assert_eq!(agent.args.get(&ConfigKey::AgencyId), Some(i.to_string().as_str()));
        assert_eq!(agent.args.get(&ConfigKey::AgencySize), Some("3"));
        assert_eq!(agent.args.get(&ConfigKey::AgencyPoolSize), Some("3"));
        assert_eq!(agent.args.get(&ConfigKey::AgencyActivate), Some("true"));
        assert_eq!(agent.args.get(&ConfigKey::AgencyMyAddress), Some(agent.endpoint.as_str()));
    }

    let first = &record.instances[0];
    assert!(!first.args.contains(&ConfigKey::AgencyEndpoint));
    assert!(!first.args.contains(&ConfigKey::AgencyNotify));

    let last = &record.instances[2];
    let expected: Vec<String> = record.instances.iter().map(|a| a.endpoint.clone()).collect();
    assert_eq!(last.args.get_all(&ConfigKey::AgencyEndpoint), expected.as_slice());
    assert_eq!(last.args.get(&ConfigKey::AgencyNotify), Some("true"));

    // the peer list reaches the command line once per endpoint
    let commands = spawned.lock().unwrap();
    assert_eq!(flag_values(&commands[2].args, "agency.endpoint"), expected);
    assert!(flag_values(&commands[1].args, "agency.endpoint").is_empty());
}

#[tokio::test]
async fn test_single_member_points_at_itself() {
    let dir = tempfile::tempdir().unwrap();
    let plan = TopologyPlanner::new().with_agency_size(1).plan_single_host("127.0.0.1", 0, 0).unwrap();
    let (spawner, _) = recording_spawner(100);
    let launcher = ProcessLauncher::new(Arc::new(spawner), options(dir.path())).with_ports(any_port());

    let record = QuorumBootstrapper::new(&launcher).bootstrap(&plan, dir.path()).await.unwrap();

    let only = &record.instances[0];
    assert_eq!(only.args.get_all(&ConfigKey::AgencyEndpoint), [only.endpoint.clone()].as_slice());
    assert_eq!(only.args.get(&ConfigKey::AgencyNotify), Some("true"));
    assert_eq!(record.endpoint, only.endpoint);
}

#[tokio::test]
async fn test_agents_get_distinct_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let plan = TopologyPlanner::new().with_agency_size(5).plan_single_host("127.0.0.1", 0, 0).unwrap();
    let (spawner, _) = recording_spawner(100);
    let launcher = ProcessLauncher::new(Arc::new(spawner), options(dir.path())).with_ports(any_port());

    let record = QuorumBootstrapper::new(&launcher).bootstrap(&plan, dir.path()).await.unwrap();

    let mut ports: Vec<u16> = record.instances.iter().map(|a| a.port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 5);
}

#[tokio::test]
async fn test_failed_member_rolls_back_started_agents() {
    let dir = tempfile::tempdir().unwrap();
    let plan = TopologyPlanner::new().with_agency_size(3).plan_single_host("127.0.0.1", 0, 0).unwrap();

    let mut spawner = MockProcessSpawner::new();
    let mut next = 100;
    spawner.expect_spawn().times(3).returning(move |command| {
        next += 1;
        if next == 103 {
            Err(OrchestratorError::spawn(command.display(), "out of memory"))
        } else {
            Ok(next)
        }
    });
    for pid in [101, 102] {
        spawner
            .expect_terminate()
            .with(eq(pid), always())
            .times(1)
            .returning(|_, _| Ok(TerminationOutcome::Exited { code: Some(0) }));
    }

    let launcher = ProcessLauncher::new(Arc::new(spawner), options(dir.path())).with_ports(any_port());
    let result = QuorumBootstrapper::new(&launcher).bootstrap(&plan, dir.path()).await;

    assert_matches!(result, Err(OrchestratorError::SpawnFailed { .. }));
}
