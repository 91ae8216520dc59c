//! Supervisor configuration.
//!
//! All knobs that govern the client protocol and the in-process substrate:
//! the claim-check threshold, query deadlines, poller liveness, and the
//! activity retry policy. Loaded from a TOML file or built from defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retry policy applied by the substrate to transient activity failures.
///
/// Validation failures are never retried regardless of this policy.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Top-level supervisor configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Payloads whose serialized size reaches this many bytes are replaced
    /// by a claim-check token before crossing the durable boundary;
    /// smaller payloads stay inline.
    #[serde(default = "default_claim_check_threshold")]
    pub claim_check_threshold: usize,
    /// Deadline for a single substrate query, in milliseconds. Exceeding it
    /// surfaces WorkerUnavailable, never SessionNotFound.
    #[serde(default = "default_query_deadline_ms")]
    pub query_deadline_ms: u64,
    /// A worker whose last poll is older than this window is considered
    /// absent and queries/updates fail with WorkerUnavailable.
    #[serde(default = "default_poller_liveness_ms")]
    pub poller_liveness_ms: u64,
    /// Retry policy for transient activity failures.
    #[serde(default)]
    pub activity_retry: RetryPolicy,
    /// Directory for the content-addressed blob store. Defaults to
    /// `<data dir>/confab/blobs` when unset.
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
}

fn default_claim_check_threshold() -> usize {
    32 * 1024
}

fn default_query_deadline_ms() -> u64 {
    5_000
}

fn default_poller_liveness_ms() -> u64 {
    10_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            claim_check_threshold: default_claim_check_threshold(),
            query_deadline_ms: default_query_deadline_ms(),
            poller_liveness_ms: default_poller_liveness_ms(),
            activity_retry: RetryPolicy::default(),
            blob_dir: None,
        }
    }
}

impl SupervisorConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Missing fields fall back to their defaults, so a partial file is
    /// valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}
