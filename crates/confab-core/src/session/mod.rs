//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: session data types (`SessionStatus`, `ChatTurn`,
//!   `ToolInvocation`, `SessionHandle`, `SessionDescription`)
//! - `workflow`: the per-conversation state machine (`SessionWorkflow`)

mod model;
mod workflow;

pub use model::{
    ChatTurn, InvocationOutcome, ProcessUserMessageInput, SessionDescription, SessionHandle,
    SessionStatus, ToolInvocation,
};
pub use workflow::SessionWorkflow;
