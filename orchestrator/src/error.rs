//! Orchestrator-specific error types

use shared::{Role, SharedError};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::LifecycleState;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Cannot place {requested} {role} instance(s): only {available} host(s) permit that role")]
    Placement { role: Role, requested: usize, available: usize },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    #[error("Destination directory already exists: {}", path.display())]
    DirectoryCollision { path: PathBuf },

    #[error("Invalid configuration value for '{key}' = '{value}': {reason}")]
    InvalidConfig { key: String, value: String, reason: String },

    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Failed to start crash supervisor for pid {pid}: {reason}")]
    SupervisorFailed { pid: u32, reason: String },

    #[error("Deployment did not become healthy after {attempts} attempts")]
    HealthTimeout { attempts: u32 },

    #[error("Operation '{operation}' is not permitted in state {state}")]
    InvalidTransition { state: LifecycleState, operation: String },

    #[error("unable to shut down cluster")]
    ShutdownIncomplete,

    #[error("unable to relaunch: {reason}")]
    RelaunchFailed { reason: String },

    #[error("Instance {name} exited while waiting for the deployment to become healthy")]
    InstanceExited { name: String },

    #[error("Every port below {upper} has already been handed out")]
    PortExhausted { upper: u16 },

    #[error("No deployment has been launched")]
    NotLaunched,

    #[error("Live status query failed: {message}")]
    StatusUnavailable { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl OrchestratorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::MissingConfiguration { field: field.into() }
    }

    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transition(state: LifecycleState, operation: impl Into<String>) -> Self {
        Self::InvalidTransition {
            state,
            operation: operation.into(),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
