//! Service-specific tests
//!
//! Launch and quorum tests drive the services through a mocked spawner and
//! an allocator that treats every port as free; directory tests use a real
//! temporary directory.

#[cfg(test)]
mod quorum;

// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::OrchestratorOptions;
    use crate::services::port_allocator::PortAllocator;
    use crate::traits::{CommandSpec, MockProcessSpawner};

    /// Commands handed to a recording spawner, in spawn order
    pub type Spawned = Arc<Mutex<Vec<CommandSpec>>>;

    /// Options rooted in `base` with no crash monitor
    pub fn options(base: &Path) -> OrchestratorOptions {
        OrchestratorOptions::builder()
            .executable("/opt/db/bin/server")
            .base_dir(base)
            .crash_monitor(None)
            .health_polling(Duration::from_millis(1), 3)
            .shutdown_grace(Duration::from_millis(10))
            .build()
            .expect("valid test options")
    }

    /// Allocator that never probes the OS
    pub fn any_port() -> Arc<PortAllocator> {
        Arc::new(PortAllocator::with_probe(|_| true))
    }

    /// Spawner handing out increasing pids and recording every command
    pub fn recording_spawner(first_pid: u32) -> (MockProcessSpawner, Spawned) {
        let spawned: Spawned = Arc::new(Mutex::new(Vec::new()));
        let next_pid = AtomicU32::new(first_pid);

        let mut spawner = MockProcessSpawner::new();
        let log = spawned.clone();
        spawner.expect_spawn().returning(move |command| {
            log.lock().unwrap().push(command.clone());
            Ok(next_pid.fetch_add(1, Ordering::SeqCst))
        });
        (spawner, spawned)
    }

    /// Every value given for `--flag` in an argv
    pub fn flag_values(argv: &[String], flag: &str) -> Vec<String> {
        let wanted = format!("--{flag}");
        argv.windows(2)
            .filter(|pair| pair[0] == wanted)
            .map(|pair| pair[1].clone())
            .collect()
    }
}
