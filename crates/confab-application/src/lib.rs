//! Application layer for the confab workspace.
//!
//! # Module Structure
//!
//! - `supervisor`: client protocol over an [`ExecutionSubstrate`]
//!
//! [`ExecutionSubstrate`]: confab_core::substrate::ExecutionSubstrate

pub mod supervisor;

pub use supervisor::{latest_text_response, SupervisorClient};
