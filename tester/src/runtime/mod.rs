//! Runtime Management
//!
//! This module drives the cluster and the test binary during a suite run.

pub mod constellation;
pub mod report;

// Re-export main types
pub use constellation::ClusterConstellation;
pub use report::SuiteReport;
