//! Cluster Test Runner
//!
//! Runs a third-party test binary against a freshly launched cluster.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tester::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = SuiteConfig::builder()
//!     .executable("/opt/db/bin/server")
//!     .test_binary("/opt/tests/smoke", vec![])
//!     .dbservers(2)
//!     .build();
//!
//! let mut constellation = ClusterConstellation::from_config(&config)?;
//! let report = constellation
//!     .execute(&TestRunner::new(), &config.test_command(), config.keep_data)
//!     .await?;
//! println!("{}", report.render());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod runtime;

// Main interfaces - re-exported at crate root for convenience
pub use config::{SuiteConfig, SuiteConfigBuilder};
pub use runtime::{ClusterConstellation, SuiteReport};

// Supporting types
pub use orchestrator::{TestRunSummary, TestRunner};
