//! Request/response schemas for the domain tool operations.

use serde::{Deserialize, Serialize};

/// A beneficiary on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    /// Stable beneficiary identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Relationship to the account holder (e.g. "spouse").
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBeneficiaryRequest {
    pub name: String,
    pub relationship: String,
    /// Caller-supplied invocation key. Two add requests carrying the same
    /// key are applied at most once; required because delivery is
    /// at-least-once.
    #[serde(default)]
    pub invocation_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBeneficiaryRequest {
    pub beneficiary_id: String,
}

/// Lifecycle status of an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentStatus {
    Open,
    Closed,
}

/// An investment position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    /// Stable investment identifier.
    pub id: String,
    /// Fund the position is held in.
    pub fund: String,
    /// Current balance.
    pub balance: f64,
    pub status: InvestmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInvestmentRequest {
    pub fund: String,
    pub initial_deposit: f64,
    /// Caller-supplied invocation key for at-least-once deduplication.
    #[serde(default)]
    pub invocation_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInvestmentRequest {
    pub investment_id: String,
}
