//! Session domain model.
//!
//! The conversation session entity and the records it is built from:
//! chat turns, tool invocations, and the client-held handle.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a conversation session.
///
/// `Open` is the initial state; `Ended` is terminal and entered only via
/// the end signal. There is no transition out of `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The session accepts updates and queries.
    Open,
    /// The session has received the end signal. Queries still answer;
    /// updates fail with a Stale condition.
    Ended,
}

/// Outcome classification of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationOutcome {
    /// The invocation succeeded on the first attempt.
    Succeeded,
    /// The invocation failed transiently and succeeded on a later attempt.
    RetriedThenSucceeded { attempts: u32 },
    /// The invocation failed terminally (validation error).
    Failed { error: String },
}

/// Record of one tool invocation made while producing a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Name of the invoked tool operation.
    pub tool_name: String,
    /// Request payload as sent to the tool.
    pub request: serde_json::Value,
    /// Response payload as returned by the tool (null on failure).
    pub response: serde_json::Value,
    /// How the invocation concluded.
    pub outcome: InvocationOutcome,
}

/// A single committed turn of the conversation.
///
/// Immutable once appended; the sequence index is the sole ordering
/// guarantee exposed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Zero-based position in the session history.
    pub index: u64,
    /// The user's input text.
    pub user_input: String,
    /// The produced textual response.
    pub text_response: String,
    /// Tool invocations performed while producing the response.
    #[serde(default)]
    pub tool_invocations: Vec<ToolInvocation>,
    /// Timestamp when the turn was committed (ISO 8601 format).
    pub created_at: String,
}

/// Input to the process-user-message update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUserMessageInput {
    /// The user's message text.
    pub user_input: String,
    /// The history length the caller last observed. When set and it does
    /// not match the session's current length, the update fails Stale so
    /// the caller reloads before resubmitting.
    #[serde(default)]
    pub expected_chat_length: Option<usize>,
}

impl ProcessUserMessageInput {
    /// Builds an input with no staleness expectation.
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            expected_chat_length: None,
        }
    }

    /// Builds an input that asserts the caller's observed history length.
    pub fn at_length(user_input: impl Into<String>, expected: usize) -> Self {
        Self {
            user_input: user_input.into(),
            expected_chat_length: Some(expected),
        }
    }
}

/// Client-held reference to a conversation session.
///
/// Not authoritative: the substrate remains the source of truth for the
/// session's current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Stable conversation identity.
    pub identity: String,
    /// Substrate-level run identifier for the specific instance.
    pub run_id: String,
}

/// Point-in-time description of a session instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Stable conversation identity.
    pub identity: String,
    /// Substrate-level run identifier.
    pub run_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Number of committed turns at the moment of the call.
    pub history_length: usize,
}
