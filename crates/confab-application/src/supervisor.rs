//! The supervisor client protocol.
//!
//! Resolves a conversation identity to exactly one addressable, currently
//! valid session, tolerating races between concurrent callers. Creation
//! safety is delegated to the substrate's single-writer arbitration; this
//! layer's job is to pick the right recovery for each failure: lazily
//! create on not-found, attach on lost creation races, surface
//! WorkerUnavailable distinctly, and hand Stale back to the caller for an
//! explicit reload.

use confab_core::config::SupervisorConfig;
use confab_core::error::{Result, SupervisorError};
use confab_core::session::{ChatTurn, ProcessUserMessageInput, SessionHandle};
use confab_core::substrate::{ConflictPolicy, ExecutionSubstrate, QueryOptions, ReusePolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// The textual response of the newest turn, if any.
pub fn latest_text_response(turns: &[ChatTurn]) -> Option<&str> {
    turns.last().map(|turn| turn.text_response.as_str())
}

/// External-facing client over the execution substrate.
///
/// Constructed once at process start and passed to every caller; there is
/// deliberately no ambient global instance.
pub struct SupervisorClient {
    substrate: Arc<dyn ExecutionSubstrate>,
    config: SupervisorConfig,
}

impl SupervisorClient {
    pub fn new(substrate: Arc<dyn ExecutionSubstrate>, config: SupervisorConfig) -> Self {
        Self { substrate, config }
    }

    /// Bounds a substrate query by the configured deadline. A timeout is a
    /// worker problem, never "session not found"; the two demand opposite
    /// recovery actions.
    async fn query_with_deadline(
        &self,
        conversation_id: &str,
        options: QueryOptions,
    ) -> Result<Vec<ChatTurn>> {
        let deadline = Duration::from_millis(self.config.query_deadline_ms);
        match timeout(deadline, self.substrate.query_history(conversation_id, options)).await {
            Ok(result) => result,
            Err(_) => Err(SupervisorError::worker_unavailable(format!(
                "query exceeded {}ms deadline (worker may be unavailable)",
                self.config.query_deadline_ms
            ))),
        }
    }

    /// Builds a handle for the currently described instance.
    async fn current_handle(&self, conversation_id: &str) -> Result<SessionHandle> {
        let description = self.substrate.describe(conversation_id).await?;
        Ok(SessionHandle {
            identity: description.identity,
            run_id: description.run_id,
        })
    }

    /// Attaches to the open session for `conversation_id`, creating one if
    /// none is open. Returns the handle and the history as of attachment
    /// (empty for a fresh session).
    ///
    /// Two concurrent callers may both attempt creation; the loser's
    /// attempt fails `AlreadyStarted` and falls back to attaching to the
    /// survivor.
    pub async fn attach_or_start(
        &self,
        conversation_id: &str,
    ) -> Result<(SessionHandle, Vec<ChatTurn>)> {
        match self
            .query_with_deadline(conversation_id, QueryOptions::rejecting_not_open())
            .await
        {
            Ok(history) => {
                tracing::debug!(conversation_id, turns = history.len(), "attached to open session");
                let handle = self.current_handle(conversation_id).await?;
                Ok((handle, history))
            }
            Err(err) if err.is_query_rejected() || err.is_not_found() => {
                tracing::info!(conversation_id, "no open session, starting one");
                match self
                    .substrate
                    .start(conversation_id, ReusePolicy::AllowDuplicate)
                    .await
                {
                    Ok(handle) => Ok((handle, Vec::new())),
                    Err(SupervisorError::AlreadyStarted { .. }) => {
                        // Lost the creation race; attach to the survivor.
                        let history = self
                            .query_with_deadline(conversation_id, QueryOptions::rejecting_not_open())
                            .await?;
                        let handle = self.current_handle(conversation_id).await?;
                        Ok((handle, history))
                    }
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Sends one user message, starting the session in the same atomic
    /// step if none is open.
    ///
    /// Returns only the newly appended turns. On `Stale` the caller must
    /// reload the full history via [`get_chat_history`] and resume from
    /// the latest turn; this layer never silently retries the update.
    ///
    /// [`get_chat_history`]: SupervisorClient::get_chat_history
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        expected_chat_length: Option<usize>,
    ) -> Result<Vec<ChatTurn>> {
        let input = ProcessUserMessageInput {
            user_input: text.to_string(),
            expected_chat_length,
        };
        let result = self
            .substrate
            .update_with_start(conversation_id, input, ConflictPolicy::UseExisting)
            .await;
        if let Err(err) = &result {
            if err.is_stale() {
                tracing::warn!(conversation_id, %err, "stale update, caller must reload");
            }
        }
        result
    }

    /// Sends the end signal. An unaddressable session (already ended or
    /// never started) is success: the desired end state already holds.
    pub async fn end_chat(&self, conversation_id: &str) -> Result<()> {
        match self.substrate.signal_end(conversation_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                tracing::debug!(conversation_id, "end signal for unknown session, nothing to do");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Explicit out-of-band warm start with a duplicate-identity-allowed
    /// policy. An already-open session satisfies the postcondition, so it
    /// returns that session's handle rather than an error.
    pub async fn start_if_absent(&self, conversation_id: &str) -> Result<SessionHandle> {
        match self
            .substrate
            .start(conversation_id, ReusePolicy::AllowDuplicate)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(SupervisorError::AlreadyStarted { .. }) => {
                self.current_handle(conversation_id).await
            }
            Err(err) => Err(SupervisorError::internal(format!(
                "could not start session '{}': {}",
                conversation_id, err
            ))),
        }
    }

    /// Reads the full committed history.
    ///
    /// An unknown identity lazily creates the session and answers with an
    /// empty list. `WorkerUnavailable` (deadline or missing poller) is
    /// surfaced untouched so callers can tell "nothing is running" from
    /// "no session exists yet".
    pub async fn get_chat_history(&self, conversation_id: &str) -> Result<Vec<ChatTurn>> {
        match self
            .query_with_deadline(conversation_id, QueryOptions::default())
            .await
        {
            Ok(history) => Ok(history),
            Err(err) if err.is_not_found() => {
                tracing::info!(conversation_id, "session unknown, creating it lazily");
                self.start_if_absent(conversation_id).await?;
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}
