//! The typed invocation contract for external domain tools.

use crate::activity::types::{
    AddBeneficiaryRequest, Beneficiary, CloseInvestmentRequest, DeleteBeneficiaryRequest,
    Investment, OpenInvestmentRequest,
};
use crate::error::SupervisorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classification for an activity invocation.
///
/// The classification is the gateway's whole retry contract: `Validation`
/// is terminal and never retried, `Transient` is retried by the substrate's
/// own retry policy. The gateway itself never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityError {
    /// Input failed validation. Terminal.
    #[error("validation: {0}")]
    Validation(String),
    /// Downstream hiccup (network, contention). Retryable.
    #[error("transient: {0}")]
    Transient(String),
}

impl ActivityError {
    /// Whether the substrate's retry policy may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<ActivityError> for SupervisorError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::Validation(msg) => Self::ActivityValidation(msg),
            ActivityError::Transient(msg) => Self::ActivityTransient(msg),
        }
    }
}

/// A type alias for `Result<T, ActivityError>`.
pub type ActivityResult<T> = std::result::Result<T, ActivityError>;

/// Capability-scoped remote operations over beneficiaries and investments.
///
/// Delivery is at-least-once: the substrate may re-attempt an invocation
/// whose acknowledgment was lost. Mutating operations therefore either
/// carry a caller-supplied invocation key (add/open) or are naturally
/// idempotent from the session's perspective (delete/close of a named id).
#[async_trait]
pub trait ActivityGateway: Send + Sync {
    async fn list_beneficiaries(&self) -> ActivityResult<Vec<Beneficiary>>;

    async fn add_beneficiary(&self, request: AddBeneficiaryRequest)
    -> ActivityResult<Beneficiary>;

    async fn delete_beneficiary(&self, request: DeleteBeneficiaryRequest) -> ActivityResult<()>;

    async fn list_investments(&self) -> ActivityResult<Vec<Investment>>;

    async fn open_investment(&self, request: OpenInvestmentRequest)
    -> ActivityResult<Investment>;

    async fn close_investment(&self, request: CloseInvestmentRequest)
    -> ActivityResult<Investment>;
}
