//! Concrete domain tool implementations.
//!
//! # Module Structure
//!
//! - `beneficiaries`: in-memory beneficiary registry
//! - `investments`: in-memory investment ledger
//!
//! `DeskActivities` bundles both behind the `ActivityGateway` contract.

mod beneficiaries;
mod investments;

use async_trait::async_trait;
use beneficiaries::BeneficiaryBook;
use confab_core::activity::{
    ActivityGateway, ActivityResult, AddBeneficiaryRequest, Beneficiary, CloseInvestmentRequest,
    DeleteBeneficiaryRequest, Investment, OpenInvestmentRequest,
};
use investments::InvestmentLedger;

/// The wealth-desk tool set: beneficiary and investment operations over
/// in-memory state.
#[derive(Default)]
pub struct DeskActivities {
    beneficiaries: BeneficiaryBook,
    investments: InvestmentLedger,
}

impl DeskActivities {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityGateway for DeskActivities {
    async fn list_beneficiaries(&self) -> ActivityResult<Vec<Beneficiary>> {
        self.beneficiaries.list().await
    }

    async fn add_beneficiary(
        &self,
        request: AddBeneficiaryRequest,
    ) -> ActivityResult<Beneficiary> {
        self.beneficiaries.add(request).await
    }

    async fn delete_beneficiary(&self, request: DeleteBeneficiaryRequest) -> ActivityResult<()> {
        self.beneficiaries.delete(request).await
    }

    async fn list_investments(&self) -> ActivityResult<Vec<Investment>> {
        self.investments.list().await
    }

    async fn open_investment(&self, request: OpenInvestmentRequest) -> ActivityResult<Investment> {
        self.investments.open(request).await
    }

    async fn close_investment(
        &self,
        request: CloseInvestmentRequest,
    ) -> ActivityResult<Investment> {
        self.investments.close(request).await
    }
}
