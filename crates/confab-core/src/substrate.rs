//! Execution substrate seam.
//!
//! The substrate is consumed as a primitive: it owns crash recovery,
//! replay, per-identity single-writer serialization, and the retry policy
//! for transient activity failures. This module defines the contract the
//! supervisor client is written against, plus the policies that govern
//! identity reuse and start/update conflicts.

use crate::error::Result;
use crate::session::{ChatTurn, ProcessUserMessageInput, SessionDescription, SessionHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Rule for starting an identity that has a prior instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReusePolicy {
    /// A prior Ended instance under the same identity may be superseded.
    /// A currently Open instance still rejects the start.
    AllowDuplicate,
    /// Any prior instance, open or ended, rejects the start.
    RejectDuplicate,
}

/// Rule for the atomic start-then-update compound when the identity
/// already has an open instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Attach to the already-open instance instead of creating a
    /// duplicate.
    UseExisting,
    /// Fail the compound with AlreadyStarted.
    Fail,
}

/// Options for a history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Reject the query (instead of answering) when the session is not
    /// currently open.
    pub reject_if_not_open: bool,
}

impl QueryOptions {
    /// Options that reject when the session is not open.
    pub fn rejecting_not_open() -> Self {
        Self {
            reject_if_not_open: true,
        }
    }
}

/// The durable execution substrate the supervisor runs against.
///
/// Implementations must serialize mutating operations per identity (some
/// total order consistent with causal submission; no stronger FIFO
/// guarantee) and keep Ended instances addressable for reads.
#[async_trait]
pub trait ExecutionSubstrate: Send + Sync {
    /// Starts a new session instance for `identity`.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` when an open instance exists, or when `policy`
    ///   is `RejectDuplicate` and any prior instance exists.
    async fn start(&self, identity: &str, policy: ReusePolicy) -> Result<SessionHandle>;

    /// Delivers the fire-and-forget end signal.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` when the identity is not addressable.
    async fn signal_end(&self, identity: &str) -> Result<()>;

    /// Reads the committed history snapshot.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` when the identity is unknown.
    /// - `QueryRejected` when `reject_if_not_open` is set and the session
    ///   is not open.
    /// - `WorkerUnavailable` when no poller is live for the work queue.
    async fn query_history(&self, identity: &str, options: QueryOptions) -> Result<Vec<ChatTurn>>;

    /// Applies a process-user-message update, returning only the newly
    /// appended turns.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` when the identity is unknown.
    /// - `Stale` when the session is not open or the caller's expected
    ///   length no longer matches.
    /// - `WorkerUnavailable` when no poller is live.
    async fn update(
        &self,
        identity: &str,
        input: ProcessUserMessageInput,
    ) -> Result<Vec<ChatTurn>>;

    /// Atomic compound: start the identity if it has no open instance,
    /// then apply the update in the same step. Removes the race window a
    /// naive attach-then-update sequence would have.
    async fn update_with_start(
        &self,
        identity: &str,
        input: ProcessUserMessageInput,
        conflict: ConflictPolicy,
    ) -> Result<Vec<ChatTurn>>;

    /// Describes the current instance for `identity`.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` when the identity is unknown.
    async fn describe(&self, identity: &str) -> Result<SessionDescription>;
}
