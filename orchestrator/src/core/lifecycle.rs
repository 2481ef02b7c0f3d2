//! Deployment lifecycle states
//!
//! ```text
//! Planned -> Launched -> HealthChecked* -> ShuttingDown -> ShutdownComplete -> CleanedUp
//!                                                     \-> ShutdownFailed
//! any post-launch state -> Relaunching -> Launched
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    Planned,
    Launched,
    HealthChecked,
    ShuttingDown,
    ShutdownComplete,
    ShutdownFailed,
    CleanedUp,
    Relaunching,
}

impl LifecycleState {
    /// Processes were started at some point and the record describes them
    pub fn is_post_launch(&self) -> bool {
        matches!(
            self,
            LifecycleState::Launched
                | LifecycleState::HealthChecked
                | LifecycleState::ShuttingDown
                | LifecycleState::ShutdownComplete
                | LifecycleState::ShutdownFailed
        )
    }

    /// Instances are believed to be running
    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Launched | LifecycleState::HealthChecked)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::CleanedUp)
    }

    pub fn can_launch(&self) -> bool {
        matches!(self, LifecycleState::Planned)
    }

    pub fn can_shutdown(&self) -> bool {
        matches!(
            self,
            LifecycleState::Launched | LifecycleState::HealthChecked | LifecycleState::ShutdownFailed
        )
    }

    pub fn can_relaunch(&self) -> bool {
        self.is_post_launch() && *self != LifecycleState::ShuttingDown
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Planned => "planned",
            LifecycleState::Launched => "launched",
            LifecycleState::HealthChecked => "health-checked",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::ShutdownComplete => "shutdown-complete",
            LifecycleState::ShutdownFailed => "shutdown-failed",
            LifecycleState::CleanedUp => "cleaned-up",
            LifecycleState::Relaunching => "relaunching",
        };
        f.write_str(name)
    }
}
