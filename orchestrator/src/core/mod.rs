//! Core orchestration logic
//!
//! Pure building blocks: planning, lifecycle states, run records, health
//! reconciliation and test-stream reduction. Nothing in here spawns processes
//! or performs I/O.

pub mod health;
pub mod lifecycle;
pub mod planner;
pub mod record;
pub mod test_events;

pub use health::{HealthEntry, HealthMonitor, HealthStatus, LiveStatus, MissingInstance};
pub use lifecycle::LifecycleState;
pub use planner::{HostId, HostSpec, Placement, Plan, TopologyPlanner, DEFAULT_AGENCY_SIZE};
pub use record::{InstanceInfo, LaunchSnapshot, RunRecord};
pub use test_events::{EventStreamReducer, TestEvent, TestEventResult, TestRunSummary};
