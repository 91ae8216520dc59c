//! Activity gateway contract.
//!
//! # Module Structure
//!
//! - `gateway`: the `ActivityGateway` trait and its error classification
//! - `types`: request/response schemas for the beneficiary and investment
//!   operations

mod gateway;
mod types;

pub use gateway::{ActivityError, ActivityGateway, ActivityResult};
pub use types::{
    AddBeneficiaryRequest, Beneficiary, CloseInvestmentRequest, DeleteBeneficiaryRequest,
    Investment, InvestmentStatus, OpenInvestmentRequest,
};
