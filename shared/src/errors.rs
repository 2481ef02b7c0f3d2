//! Shared error types for the cluster orchestration workspace

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unknown instance role: {input}")]
    InvalidRole { input: String },

    #[error("Unknown endpoint protocol: {input}")]
    InvalidProtocol { input: String },

    #[error("Malformed endpoint: {endpoint}")]
    InvalidEndpoint { endpoint: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
