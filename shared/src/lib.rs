//! Shared types for the cluster orchestration workspace
//!
//! Contains the vocabulary every binary agrees on: who is logging, which
//! roles a deployment is made of and how endpoints are spelled.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
