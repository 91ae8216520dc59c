//! Deterministic responder for the wealth desk.
//!
//! Routes a user message to the matching gateway operation and formats a
//! textual answer. This is the stand-in for the reasoning layer: the
//! session workflow only ever sees the `Responder` trait, so swapping in a
//! model-backed responder touches nothing else.
//!
//! Transient activity failures are retried here according to the
//! substrate's retry policy; validation failures are terminal and turn
//! into an explanatory response instead.

use async_trait::async_trait;
use confab_core::activity::{
    ActivityError, ActivityGateway, ActivityResult, AddBeneficiaryRequest, CloseInvestmentRequest,
    DeleteBeneficiaryRequest, OpenInvestmentRequest,
};
use confab_core::agent::{Responder, TurnOutcome};
use confab_core::config::RetryPolicy;
use confab_core::error::Result;
use confab_core::session::{InvocationOutcome, ToolInvocation};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const HELP_TEXT: &str = "I can help you manage beneficiaries and investments. Try: \
'list beneficiaries', 'add beneficiary <name> <relationship>', \
'delete beneficiary <id>', 'list investments', \
'open investment <fund> <amount>', or 'close investment <id>'.";

/// Rule-based responder over the six wealth-desk operations.
pub struct DeskResponder {
    gateway: Arc<dyn ActivityGateway>,
    retry: RetryPolicy,
}

impl DeskResponder {
    pub fn new(gateway: Arc<dyn ActivityGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    /// Drives one gateway call under the retry policy and records the
    /// invocation.
    ///
    /// Transient failures are retried with doubling backoff up to
    /// `max_attempts`; validation failures stop immediately. The record
    /// always lands in the turn, success or not.
    async fn invoke<T, F, Fut>(
        &self,
        tool_name: &str,
        request: serde_json::Value,
        call: F,
    ) -> (ToolInvocation, ActivityResult<T>)
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = ActivityResult<T>>,
    {
        let mut attempt = 1u32;
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let result = loop {
            match call().await {
                Ok(value) => break Ok((value, attempt)),
                Err(err @ ActivityError::Transient(_)) if attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        tool = tool_name,
                        attempt,
                        error = %err,
                        "transient activity failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        match result {
            Ok((value, attempts)) => {
                let response = serde_json::to_value(&value).unwrap_or(serde_json::Value::Null);
                let outcome = if attempts > 1 {
                    InvocationOutcome::RetriedThenSucceeded { attempts }
                } else {
                    InvocationOutcome::Succeeded
                };
                let record = ToolInvocation {
                    tool_name: tool_name.to_string(),
                    request,
                    response,
                    outcome,
                };
                (record, Ok(value))
            }
            Err(err) => {
                let record = ToolInvocation {
                    tool_name: tool_name.to_string(),
                    request,
                    response: serde_json::Value::Null,
                    outcome: InvocationOutcome::Failed {
                        error: err.to_string(),
                    },
                };
                (record, Err(err))
            }
        }
    }

    /// Folds a terminal activity failure into a user-facing turn instead
    /// of failing the update.
    fn explain(record: ToolInvocation, err: &ActivityError, action: &str) -> TurnOutcome {
        TurnOutcome {
            text_response: format!("I couldn't {}: {}", action, err),
            invocations: vec![record],
        }
    }
}

#[async_trait]
impl Responder for DeskResponder {
    async fn respond(&self, user_input: &str) -> Result<TurnOutcome> {
        let lowered = user_input.trim().to_lowercase();
        let words: Vec<&str> = user_input.split_whitespace().collect();

        if lowered.contains("beneficiar") && (lowered.starts_with("list") || lowered == "beneficiaries")
        {
            let (record, result) = self
                .invoke("list_beneficiaries", serde_json::Value::Null, || {
                    self.gateway.list_beneficiaries()
                })
                .await;
            return match result {
                Ok(all) if all.is_empty() => Ok(TurnOutcome {
                    text_response: "You have no beneficiaries on file.".to_string(),
                    invocations: vec![record],
                }),
                Ok(all) => {
                    let lines: Vec<String> = all
                        .iter()
                        .map(|b| format!("{}: {} ({})", b.id, b.name, b.relationship))
                        .collect();
                    Ok(TurnOutcome {
                        text_response: format!("Your beneficiaries:\n{}", lines.join("\n")),
                        invocations: vec![record],
                    })
                }
                Err(err) => Err(err.into()),
            };
        }

        if lowered.starts_with("add beneficiary") {
            // add beneficiary <name> <relationship>
            if words.len() < 4 {
                return Ok(TurnOutcome::text(
                    "Usage: add beneficiary <name> <relationship>",
                ));
            }
            let request = AddBeneficiaryRequest {
                name: words[2].to_string(),
                relationship: words[3..].join(" "),
                invocation_key: Some(uuid::Uuid::new_v4().to_string()),
            };
            let request_value = serde_json::to_value(&request)?;
            let (record, result) = self
                .invoke("add_beneficiary", request_value, || {
                    self.gateway.add_beneficiary(request.clone())
                })
                .await;
            return match result {
                Ok(b) => Ok(TurnOutcome {
                    text_response: format!(
                        "Added beneficiary {} ({}) as {}.",
                        b.name, b.relationship, b.id
                    ),
                    invocations: vec![record],
                }),
                Err(err @ ActivityError::Validation(_)) => {
                    Ok(Self::explain(record, &err, "add that beneficiary"))
                }
                Err(err) => Err(err.into()),
            };
        }

        if lowered.starts_with("delete beneficiary") || lowered.starts_with("remove beneficiary") {
            if words.len() < 3 {
                return Ok(TurnOutcome::text("Usage: delete beneficiary <id>"));
            }
            let request = DeleteBeneficiaryRequest {
                beneficiary_id: words[2].to_string(),
            };
            let request_value = serde_json::to_value(&request)?;
            let (record, result) = self
                .invoke("delete_beneficiary", request_value, || {
                    self.gateway.delete_beneficiary(request.clone())
                })
                .await;
            return match result {
                Ok(()) => Ok(TurnOutcome {
                    text_response: format!("Deleted beneficiary {}.", request.beneficiary_id),
                    invocations: vec![record],
                }),
                Err(err @ ActivityError::Validation(_)) => {
                    Ok(Self::explain(record, &err, "delete that beneficiary"))
                }
                Err(err) => Err(err.into()),
            };
        }

        if lowered.contains("investment") && lowered.starts_with("list") {
            let (record, result) = self
                .invoke("list_investments", serde_json::Value::Null, || {
                    self.gateway.list_investments()
                })
                .await;
            return match result {
                Ok(all) if all.is_empty() => Ok(TurnOutcome {
                    text_response: "You have no investments on file.".to_string(),
                    invocations: vec![record],
                }),
                Ok(all) => {
                    let lines: Vec<String> = all
                        .iter()
                        .map(|i| {
                            format!("{}: {} {:.2} ({:?})", i.id, i.fund, i.balance, i.status)
                        })
                        .collect();
                    Ok(TurnOutcome {
                        text_response: format!("Your investments:\n{}", lines.join("\n")),
                        invocations: vec![record],
                    })
                }
                Err(err) => Err(err.into()),
            };
        }

        if lowered.starts_with("open investment") {
            // open investment <fund> <amount>
            if words.len() < 4 {
                return Ok(TurnOutcome::text("Usage: open investment <fund> <amount>"));
            }
            let Ok(amount) = words[words.len() - 1].parse::<f64>() else {
                return Ok(TurnOutcome::text("Usage: open investment <fund> <amount>"));
            };
            let request = OpenInvestmentRequest {
                fund: words[2..words.len() - 1].join(" "),
                initial_deposit: amount,
                invocation_key: Some(uuid::Uuid::new_v4().to_string()),
            };
            let request_value = serde_json::to_value(&request)?;
            let (record, result) = self
                .invoke("open_investment", request_value, || {
                    self.gateway.open_investment(request.clone())
                })
                .await;
            return match result {
                Ok(i) => Ok(TurnOutcome {
                    text_response: format!(
                        "Opened investment {} in {} with {:.2}.",
                        i.id, i.fund, i.balance
                    ),
                    invocations: vec![record],
                }),
                Err(err @ ActivityError::Validation(_)) => {
                    Ok(Self::explain(record, &err, "open that investment"))
                }
                Err(err) => Err(err.into()),
            };
        }

        if lowered.starts_with("close investment") {
            if words.len() < 3 {
                return Ok(TurnOutcome::text("Usage: close investment <id>"));
            }
            let request = CloseInvestmentRequest {
                investment_id: words[2].to_string(),
            };
            let request_value = serde_json::to_value(&request)?;
            let (record, result) = self
                .invoke("close_investment", request_value, || {
                    self.gateway.close_investment(request.clone())
                })
                .await;
            return match result {
                Ok(i) => Ok(TurnOutcome {
                    text_response: format!("Closed investment {} in {}.", i.id, i.fund),
                    invocations: vec![record],
                }),
                Err(err @ ActivityError::Validation(_)) => {
                    Ok(Self::explain(record, &err, "close that investment"))
                }
                Err(err) => Err(err.into()),
            };
        }

        Ok(TurnOutcome::text(HELP_TEXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::DeskActivities;
    use confab_core::activity::{ActivityGateway, Beneficiary, Investment};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn desk_responder() -> DeskResponder {
        DeskResponder::new(
            Arc::new(DeskActivities::new()),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_unrecognized_input_gets_help_text() {
        let responder = desk_responder();
        let outcome = responder.respond("Hello").await.unwrap();
        assert!(!outcome.text_response.is_empty());
        assert!(outcome.invocations.is_empty());
    }

    #[tokio::test]
    async fn test_add_then_list_beneficiaries() {
        let responder = desk_responder();

        let added = responder
            .respond("add beneficiary Alice spouse")
            .await
            .unwrap();
        assert_eq!(added.invocations.len(), 1);
        assert_eq!(added.invocations[0].tool_name, "add_beneficiary");
        assert_eq!(added.invocations[0].outcome, InvocationOutcome::Succeeded);
        assert!(added.text_response.contains("Alice"));

        let listed = responder.respond("list beneficiaries").await.unwrap();
        assert!(listed.text_response.contains("Alice"));
        assert_eq!(listed.invocations[0].tool_name, "list_beneficiaries");
    }

    #[tokio::test]
    async fn test_validation_failure_becomes_explanatory_turn() {
        let responder = desk_responder();
        let outcome = responder.respond("delete beneficiary ben-404").await.unwrap();
        assert!(outcome.text_response.contains("couldn't"));
        assert!(matches!(
            outcome.invocations[0].outcome,
            InvocationOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_open_and_close_investment() {
        let responder = desk_responder();

        let opened = responder
            .respond("open investment IndexFund 1000")
            .await
            .unwrap();
        assert!(opened.text_response.contains("IndexFund"));
        let id = opened.invocations[0].response["id"].as_str().unwrap().to_string();

        let closed = responder
            .respond(&format!("close investment {}", id))
            .await
            .unwrap();
        assert!(closed.text_response.contains("Closed"));
    }

    /// Gateway whose list operation fails transiently a fixed number of
    /// times before succeeding.
    struct FlakyGateway {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl ActivityGateway for FlakyGateway {
        async fn list_beneficiaries(&self) -> ActivityResult<Vec<Beneficiary>> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(ActivityError::Transient("downstream timeout".to_string()));
            }
            Ok(Vec::new())
        }

        async fn add_beneficiary(
            &self,
            _request: AddBeneficiaryRequest,
        ) -> ActivityResult<Beneficiary> {
            unimplemented!()
        }

        async fn delete_beneficiary(
            &self,
            _request: DeleteBeneficiaryRequest,
        ) -> ActivityResult<()> {
            unimplemented!()
        }

        async fn list_investments(&self) -> ActivityResult<Vec<Investment>> {
            unimplemented!()
        }

        async fn open_investment(
            &self,
            _request: OpenInvestmentRequest,
        ) -> ActivityResult<Investment> {
            unimplemented!()
        }

        async fn close_investment(
            &self,
            _request: CloseInvestmentRequest,
        ) -> ActivityResult<Investment> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_then_succeed() {
        let responder = DeskResponder::new(
            Arc::new(FlakyGateway {
                failures_left: AtomicU32::new(2),
            }),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
            },
        );

        let outcome = responder.respond("list beneficiaries").await.unwrap();
        assert_eq!(
            outcome.invocations[0].outcome,
            InvocationOutcome::RetriedThenSucceeded { attempts: 3 }
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_turn() {
        let responder = DeskResponder::new(
            Arc::new(FlakyGateway {
                failures_left: AtomicU32::new(10),
            }),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 1,
            },
        );

        let err = responder.respond("list beneficiaries").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
