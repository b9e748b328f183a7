// src/core/errors.rs

//! Defines the primary error type for the controller.

use std::sync::Arc;
use thiserror::Error;

/// The error taxonomy of the controller core, surfaced to RPC callers and to
/// logs. Every variant maps to exactly one of the kinds documented in the
/// external-interface specification.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("validation failed: {0}")]
    ValidationFail(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("node down: {0}")]
    NodeDown(String),

    #[error("preempted: {0}")]
    Preempted(String),

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for ClusterError {
    fn clone(&self) -> Self {
        match self {
            ClusterError::InvalidRequest(s) => ClusterError::InvalidRequest(s.clone()),
            ClusterError::NotFound(s) => ClusterError::NotFound(s.clone()),
            ClusterError::Permission(s) => ClusterError::Permission(s.clone()),
            ClusterError::Duplicate(s) => ClusterError::Duplicate(s.clone()),
            ClusterError::AlreadyTerminal(s) => ClusterError::AlreadyTerminal(s.clone()),
            ClusterError::InsufficientResources(s) => {
                ClusterError::InsufficientResources(s.clone())
            }
            ClusterError::ValidationFail(s) => ClusterError::ValidationFail(s.clone()),
            ClusterError::Timeout(s) => ClusterError::Timeout(s.clone()),
            ClusterError::NodeDown(s) => ClusterError::NodeDown(s.clone()),
            ClusterError::Preempted(s) => ClusterError::Preempted(s.clone()),
            ClusterError::FatalConfig(s) => ClusterError::FatalConfig(s.clone()),
            ClusterError::Io(e) => ClusterError::Io(Arc::clone(e)),
            ClusterError::Internal(s) => ClusterError::Internal(s.clone()),
        }
    }
}

impl PartialEq for ClusterError {
    fn eq(&self, other: &Self) -> bool {
        use ClusterError::*;
        match (self, other) {
            (InvalidRequest(a), InvalidRequest(b)) => a == b,
            (NotFound(a), NotFound(b)) => a == b,
            (Permission(a), Permission(b)) => a == b,
            (Duplicate(a), Duplicate(b)) => a == b,
            (AlreadyTerminal(a), AlreadyTerminal(b)) => a == b,
            (InsufficientResources(a), InsufficientResources(b)) => a == b,
            (ValidationFail(a), ValidationFail(b)) => a == b,
            (Timeout(a), Timeout(b)) => a == b,
            (NodeDown(a), NodeDown(b)) => a == b,
            (Preempted(a), Preempted(b)) => a == b,
            (FatalConfig(a), FatalConfig(b)) => a == b,
            (Io(a), Io(b)) => a.to_string() == b.to_string(),
            (Internal(a), Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Internal(format!("JSON error: {e}"))
    }
}

impl From<toml::de::Error> for ClusterError {
    fn from(e: toml::de::Error) -> Self {
        ClusterError::FatalConfig(format!("TOML parse error: {e}"))
    }
}

impl From<bincode::error::EncodeError> for ClusterError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ClusterError::Internal(format!("state encode error: {e}"))
    }
}

impl From<bincode::error::DecodeError> for ClusterError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ClusterError::Internal(format!("state decode error: {e}"))
    }
}
