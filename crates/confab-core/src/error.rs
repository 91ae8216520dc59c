//! Error types for the Confab supervisor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire supervisor stack.
///
/// Variants are split along recovery lines rather than transport lines:
/// `SessionNotFound` and `QueryRejected` are benign and trigger lazy
/// creation, `WorkerUnavailable` is an infrastructure condition that must
/// never be answered by creating new work, and `Stale` requires the caller
/// to reload history before resubmitting.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum SupervisorError {
    /// No session instance exists for the identity.
    #[error("Session not found: '{identity}'")]
    SessionNotFound { identity: String },

    /// A read was issued with a reject-if-not-open condition and the
    /// session is not currently open.
    #[error("Query rejected: session '{identity}' is not open")]
    QueryRejected { identity: String },

    /// A creation attempt collided with an already-open instance.
    #[error("Session already started: '{identity}'")]
    AlreadyStarted { identity: String },

    /// No worker has recently polled the task queue, or a query exceeded
    /// its deadline. Distinct from `SessionNotFound`: the recovery action
    /// is to wait or alert, never to create a session nobody can execute.
    #[error("Worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    /// The session advanced or ended since the caller's last read. The
    /// caller must reload the full history before resubmitting.
    #[error("Stale session: {message}")]
    Stale { message: String },

    /// Activity input failed validation. Terminal, never retried.
    #[error("Activity validation error: {0}")]
    ActivityValidation(String),

    /// Activity failed transiently. Retried by the substrate's retry
    /// policy, not by the caller.
    #[error("Activity transient error: {0}")]
    ActivityTransient(String),

    /// A blob locator resolved to nothing.
    #[error("Blob not found: '{locator}'")]
    BlobMissing { locator: String },

    /// Fetched blob bytes did not match the token's content hash.
    #[error("Blob content hash mismatch for '{locator}'")]
    HashMismatch { locator: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// IO error (blob store, config files).
    #[error("IO error: {message}")]
    Io { message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Creates a SessionNotFound error.
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::SessionNotFound {
            identity: identity.into(),
        }
    }

    /// Creates a QueryRejected error.
    pub fn query_rejected(identity: impl Into<String>) -> Self {
        Self::QueryRejected {
            identity: identity.into(),
        }
    }

    /// Creates an AlreadyStarted error.
    pub fn already_started(identity: impl Into<String>) -> Self {
        Self::AlreadyStarted {
            identity: identity.into(),
        }
    }

    /// Creates a WorkerUnavailable error.
    pub fn worker_unavailable(reason: impl Into<String>) -> Self {
        Self::WorkerUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a Stale error.
    pub fn stale(message: impl Into<String>) -> Self {
        Self::Stale {
            message: message.into(),
        }
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a SessionNotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }

    /// Check if this is a QueryRejected error.
    pub fn is_query_rejected(&self) -> bool {
        matches!(self, Self::QueryRejected { .. })
    }

    /// Check if this is a WorkerUnavailable error.
    pub fn is_worker_unavailable(&self) -> bool {
        matches!(self, Self::WorkerUnavailable { .. })
    }

    /// Check if this is a Stale error.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    /// Check if the substrate's retry policy may retry the operation.
    ///
    /// Only transient activity failures qualify; validation failures are
    /// terminal by contract.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ActivityTransient(_))
    }
}

impl From<std::io::Error> for SupervisorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for SupervisorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SupervisorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A type alias for `Result<T, SupervisorError>`.
pub type Result<T> = std::result::Result<T, SupervisorError>;
