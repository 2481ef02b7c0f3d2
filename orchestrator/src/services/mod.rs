//! Service implementations
//!
//! Components that perform real I/O: port probing, process spawning,
//! directory management, HTTP status queries and subprocess streams.

pub mod event_stream;
pub mod file_system;
pub mod launcher;
pub mod port_allocator;
pub mod quorum;
pub mod spawner;
pub mod status_source;
pub mod test_runner;

#[cfg(test)]
mod tests;

pub use event_stream::SubprocessEventStreamParser;
pub use file_system::{InstanceDirs, RunDirectories};
pub use launcher::{LaunchRequest, ProcessLauncher};
pub use port_allocator::PortAllocator;
pub use quorum::QuorumBootstrapper;
pub use spawner::TokioSpawner;
pub use status_source::{ClusterHealth, HttpStatusSource};
pub use test_runner::TestRunner;
