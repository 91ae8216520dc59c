//! In-memory investment ledger.

use confab_core::activity::{
    ActivityError, ActivityResult, CloseInvestmentRequest, Investment, InvestmentStatus,
    OpenInvestmentRequest,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Investment positions plus applied invocation keys for open-request
/// deduplication.
#[derive(Default)]
pub(crate) struct InvestmentLedger {
    entries: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    investments: Vec<Investment>,
    applied_keys: HashMap<String, Investment>,
    next_id: u64,
}

impl InvestmentLedger {
    pub(crate) async fn list(&self) -> ActivityResult<Vec<Investment>> {
        Ok(self.entries.lock().await.investments.clone())
    }

    pub(crate) async fn open(&self, request: OpenInvestmentRequest) -> ActivityResult<Investment> {
        if request.fund.trim().is_empty() {
            return Err(ActivityError::Validation(
                "fund name must not be empty".to_string(),
            ));
        }
        if !request.initial_deposit.is_finite() || request.initial_deposit <= 0.0 {
            return Err(ActivityError::Validation(
                "initial deposit must be positive".to_string(),
            ));
        }

        let mut state = self.entries.lock().await;

        if let Some(key) = &request.invocation_key {
            if let Some(existing) = state.applied_keys.get(key) {
                return Ok(existing.clone());
            }
        }

        state.next_id += 1;
        let investment = Investment {
            id: format!("inv-{}", state.next_id),
            fund: request.fund.trim().to_string(),
            balance: request.initial_deposit,
            status: InvestmentStatus::Open,
        };
        state.investments.push(investment.clone());
        if let Some(key) = request.invocation_key {
            state.applied_keys.insert(key, investment.clone());
        }
        Ok(investment)
    }

    pub(crate) async fn close(&self, request: CloseInvestmentRequest) -> ActivityResult<Investment> {
        let mut state = self.entries.lock().await;
        let Some(investment) = state
            .investments
            .iter_mut()
            .find(|i| i.id == request.investment_id)
        else {
            return Err(ActivityError::Validation(format!(
                "no investment with id '{}'",
                request.investment_id
            )));
        };

        // Closing an already-closed position is idempotent.
        investment.status = InvestmentStatus::Closed;
        Ok(investment.clone())
    }
}
