//! In-memory beneficiary registry.

use confab_core::activity::{
    ActivityError, ActivityResult, AddBeneficiaryRequest, Beneficiary, DeleteBeneficiaryRequest,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Beneficiary state plus the invocation keys already applied, so
/// at-least-once redelivery of an add is applied at most once.
#[derive(Default)]
pub(crate) struct BeneficiaryBook {
    entries: Mutex<BookState>,
}

#[derive(Default)]
struct BookState {
    beneficiaries: Vec<Beneficiary>,
    applied_keys: HashMap<String, Beneficiary>,
    next_id: u64,
}

impl BeneficiaryBook {
    pub(crate) async fn list(&self) -> ActivityResult<Vec<Beneficiary>> {
        Ok(self.entries.lock().await.beneficiaries.clone())
    }

    pub(crate) async fn add(&self, request: AddBeneficiaryRequest) -> ActivityResult<Beneficiary> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ActivityError::Validation(
                "beneficiary name must not be empty".to_string(),
            ));
        }
        if request.relationship.trim().is_empty() {
            return Err(ActivityError::Validation(
                "beneficiary relationship must not be empty".to_string(),
            ));
        }

        let mut state = self.entries.lock().await;

        // Redelivered invocation: return the previously created record.
        if let Some(key) = &request.invocation_key {
            if let Some(existing) = state.applied_keys.get(key) {
                return Ok(existing.clone());
            }
        }

        state.next_id += 1;
        let beneficiary = Beneficiary {
            id: format!("ben-{}", state.next_id),
            name: name.to_string(),
            relationship: request.relationship.trim().to_string(),
        };
        state.beneficiaries.push(beneficiary.clone());
        if let Some(key) = request.invocation_key {
            state.applied_keys.insert(key, beneficiary.clone());
        }
        Ok(beneficiary)
    }

    pub(crate) async fn delete(&self, request: DeleteBeneficiaryRequest) -> ActivityResult<()> {
        let mut state = self.entries.lock().await;
        let before = state.beneficiaries.len();
        state
            .beneficiaries
            .retain(|b| b.id != request.beneficiary_id);
        if state.beneficiaries.len() == before {
            return Err(ActivityError::Validation(format!(
                "no beneficiary with id '{}'",
                request.beneficiary_id
            )));
        }
        Ok(())
    }
}
