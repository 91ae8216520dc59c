//! Core domain for the Confab conversation-session supervisor.
//!
//! This crate holds everything the rest of the workspace is written
//! against: the session state machine, the claim-check codec, the
//! activity gateway contract, the execution substrate seam, the error
//! taxonomy, and configuration.

pub mod activity;
pub mod agent;
pub mod claim_check;
pub mod config;
pub mod error;
pub mod session;
pub mod substrate;

// Re-export common error type
pub use error::{Result, SupervisorError};
