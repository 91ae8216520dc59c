//! The per-conversation session state machine.
//!
//! `SessionWorkflow` owns the ordered, append-only history and applies
//! mutations. It is deliberately free of any substrate concern: the
//! runtime that hosts it guarantees single-threaded execution per
//! identity, so the methods here take `&mut self` and never lock.

use crate::agent::Responder;
use crate::error::{Result, SupervisorError};
use crate::session::model::{ChatTurn, ProcessUserMessageInput, SessionStatus};

/// The durable per-conversation entity: ordered history, lifecycle status,
/// and the update/query/signal operations against them.
#[derive(Debug)]
pub struct SessionWorkflow {
    status: SessionStatus,
    history: Vec<ChatTurn>,
}

impl Default for SessionWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionWorkflow {
    /// Creates a workflow in the `Open` state with an empty history.
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Open,
            history: Vec::new(),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Read-only snapshot of all committed turns.
    ///
    /// Valid in either state, including after `end`: a terminated session
    /// still answers with its full final history.
    pub fn chat_history(&self) -> Vec<ChatTurn> {
        self.history.clone()
    }

    /// Number of committed turns.
    pub fn history_length(&self) -> usize {
        self.history.len()
    }

    /// Applies one user message: appends the input, drives tool
    /// invocations through the responder, and commits the resulting turn.
    ///
    /// Returns exactly the turns newly appended by this call, never the
    /// full history. Either the turn fully commits or nothing is appended.
    ///
    /// # Errors
    ///
    /// - `Stale` when the session is not open, or when the caller's
    ///   `expected_chat_length` no longer matches the current history.
    /// - Any error from the responder (the turn is not committed).
    pub async fn process_user_message(
        &mut self,
        input: ProcessUserMessageInput,
        responder: &dyn Responder,
    ) -> Result<Vec<ChatTurn>> {
        let turn = self.prepare_user_message(input, responder).await?;
        self.commit_turn(turn.clone());
        Ok(vec![turn])
    }

    /// Builds the turn one user message would append, without appending it.
    ///
    /// Validates the session state and drives the responder, but leaves
    /// the history untouched: the runtime journals the prepared turn
    /// first and only then makes it visible via [`commit_turn`]. A
    /// prepared turn that is never committed leaves no trace.
    ///
    /// # Errors
    ///
    /// Same as [`process_user_message`].
    ///
    /// [`commit_turn`]: SessionWorkflow::commit_turn
    /// [`process_user_message`]: SessionWorkflow::process_user_message
    pub async fn prepare_user_message(
        &self,
        input: ProcessUserMessageInput,
        responder: &dyn Responder,
    ) -> Result<ChatTurn> {
        if self.status != SessionStatus::Open {
            return Err(SupervisorError::stale(
                "session has ended; reload history before resubmitting",
            ));
        }
        if let Some(expected) = input.expected_chat_length {
            if expected != self.history.len() {
                return Err(SupervisorError::stale(format!(
                    "caller observed {} turns but session has {}",
                    expected,
                    self.history.len()
                )));
            }
        }

        let outcome = responder.respond(&input.user_input).await?;

        Ok(ChatTurn {
            index: self.history.len() as u64,
            user_input: input.user_input,
            text_response: outcome.text_response,
            tool_invocations: outcome.invocations,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Appends a prepared turn to the history.
    pub fn commit_turn(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    /// Handles the end signal: `Open` → `Ended`.
    ///
    /// Idempotent in effect; a second call is a no-op.
    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
    }
}
