//! Test fixtures and data for orchestrator tests
//!
//! This module provides consistent test data and fixtures used across all test suites.

use std::path::Path;
use std::time::Duration;

use orchestrator::{HostSpec, OrchestratorOptions, Plan, TopologyPlanner};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const ADDRESS: &'static str = "127.0.0.1";
    pub const EXECUTABLE: &'static str = "/opt/db/bin/server";

    /// Standard topology: 3 agents, 2 data servers, 1 router
    pub const AGENCY_SIZE: u32 = 3;
    pub const DBSERVERS: u32 = 2;
    pub const COORDINATORS: u32 = 1;

    /// First pid handed out by the mocked spawner
    pub const FIRST_PID: u32 = 100;

    pub const HEALTH_ATTEMPTS: u32 = 3;

    /// Single-host plan of the standard topology
    pub fn plan() -> Plan {
        Self::plan_of(Self::COORDINATORS, Self::DBSERVERS)
    }

    pub fn plan_of(coordinators: u32, dbservers: u32) -> Plan {
        TopologyPlanner::new()
            .with_agency_size(Self::AGENCY_SIZE)
            .plan_single_host(Self::ADDRESS, coordinators, dbservers)
            .unwrap()
    }

    /// Hosts where only the first may run routers and only the others data servers
    pub fn split_hosts() -> Vec<HostSpec> {
        vec![
            HostSpec::new("10.0.0.1", true, false),
            HostSpec::new("10.0.0.2", false, true),
            HostSpec::new("10.0.0.3", false, true),
        ]
    }

    /// Options rooted in `base` with fast health polling
    pub fn options(base: &Path) -> OrchestratorOptions {
        OrchestratorOptions::builder()
            .executable(Self::EXECUTABLE)
            .base_dir(base)
            .crash_monitor(None)
            .health_polling(Duration::from_millis(1), Self::HEALTH_ATTEMPTS)
            .shutdown_grace(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    /// Event stream of a run where `T1` passes and `T2` fails
    pub fn mixed_event_stream() -> &'static str {
        concat!(
            "{\"Test\":\"T1\",\"Action\":\"run\"}\n",
            "{\"Test\":\"T1\",\"Action\":\"output\",\"Output\":\"=== RUN T1\\n\"}\n",
            "{\"Test\":\"T1\",\"Action\":\"pass\",\"Elapsed\":0.25}\n",
            "{\"Test\":\"T2\",\"Action\":\"run\"}\n",
            "{\"Test\":\"T2\",\"Action\":\"output\",\"Output\":\"boom\\n\"}\n",
            "{\"Test\":\"T2\",\"Action\":\"fail\",\"Elapsed\":1.5}\n",
            "{\"Action\":\"output\",\"Output\":\"FAIL\\n\"}\n",
            "{\"Action\":\"fail\",\"Elapsed\":1.8}\n",
        )
    }
}
