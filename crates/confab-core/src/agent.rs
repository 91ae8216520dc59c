//! Responder trait: the seam between the session workflow and whatever
//! produces responses.
//!
//! The workflow is written solely against this trait; the reasoning
//! strategy behind it (rule-based router, LLM, scripted test double) is a
//! collaborator concern.

use crate::error::Result;
use crate::session::ToolInvocation;
use async_trait::async_trait;

/// Everything a responder produced for one user message: the textual
/// response plus the tool invocations it drove to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The textual response shown to the user.
    pub text_response: String,
    /// Tool invocations performed while producing the response, in call
    /// order.
    pub invocations: Vec<ToolInvocation>,
}

impl TurnOutcome {
    /// A plain-text outcome with no tool invocations.
    pub fn text(text_response: impl Into<String>) -> Self {
        Self {
            text_response: text_response.into(),
            invocations: Vec::new(),
        }
    }
}

/// Produces the response for a single user message.
///
/// A responder may suspend for an arbitrary duration (tool calls are
/// network calls); the substrate checkpoints around the invocation so a
/// crash resumes at the suspension point.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce the outcome for `user_input`.
    ///
    /// An `Err` aborts the whole update: no partial turn becomes visible.
    async fn respond(&self, user_input: &str) -> Result<TurnOutcome>;
}
