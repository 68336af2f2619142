//! Execution runner.
//!
//! Drives one array through its lifecycle: a planning pass simulates
//! every transaction item sequentially on one fork and promotes
//! survivors to `ready`, then a run pass hands eligible items to the
//! external [`Submitter`] and records outcomes. Items gated on
//! confirmation halt the run until approved.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use fork_sandbox_core::{
    BatchItem, BatchSimulationRequest, BuildMode, SequentialSimulationResult, Simulator,
};

use crate::array::{ArrayError, ExecutionArray};
use crate::item::{ExecutionItem, ExecutionKind, ExecutionStatus};

/// Performs the real submission of an item (signing and broadcast live
/// outside this core).
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, item: &ExecutionItem) -> Result<Value>;
}

/// What a run pass accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed: usize,
    pub failed: usize,
    /// Item halted on its confirmation gate, if any.
    pub awaiting_confirmation: Option<String>,
}

pub struct ExecutionRunner {
    simulator: Arc<Simulator>,
    submitter: Arc<dyn Submitter>,
    endpoints: Vec<String>,
}

impl ExecutionRunner {
    pub fn new(
        simulator: Arc<Simulator>,
        submitter: Arc<dyn Submitter>,
        endpoints: Vec<String>,
    ) -> Self {
        ExecutionRunner {
            simulator,
            submitter,
            endpoints,
        }
    }

    /// Planning pass: simulate all transaction items in order on one
    /// shared fork. Surviving items move to `ready`; a blocking failure
    /// marks its item `failed` (cancelling dependents) and leaves items
    /// after it untouched.
    pub async fn plan(&self, array: &Arc<ExecutionArray>) -> Result<SequentialSimulationResult> {
        let items = array.get_items();
        let transactions: Vec<&ExecutionItem> = items
            .iter()
            .filter(|i| i.kind == ExecutionKind::Transaction)
            .collect();
        if transactions.is_empty() {
            return Ok(SequentialSimulationResult {
                success: true,
                error: None,
                results: Vec::new(),
                total_estimated_fee: "0".to_string(),
            });
        }

        let request = BatchSimulationRequest {
            endpoints: self.endpoints.clone(),
            items: transactions
                .iter()
                .map(|i| batch_item(i))
                .collect::<Result<Vec<_>>>()?,
            build_mode: BuildMode::Instant,
        };
        let outcome = self
            .simulator
            .simulate_sequential(&request)
            .await
            .map_err(|e| anyhow!("{e}"))?;

        for step in &outcome.results {
            let item = transactions[step.index];
            if step.result.success {
                array.update_status(&item.id, ExecutionStatus::Ready, None)?;
            } else {
                let reason = step
                    .result
                    .error
                    .clone()
                    .unwrap_or_else(|| "simulation failed".to_string());
                array.update_status(&item.id, ExecutionStatus::Failed, Some(&reason))?;
            }
        }
        Ok(outcome)
    }

    /// Run pass: submit every eligible item in order. Halts on the first
    /// unapproved confirmation gate; a submission failure marks its item
    /// `failed` and continues with independent siblings.
    pub async fn run(&self, array: &Arc<ExecutionArray>) -> Result<RunReport> {
        let mut report = RunReport {
            completed: 0,
            failed: 0,
            awaiting_confirmation: None,
        };
        array.set_executing(true);
        let total = array.get_items().len();

        for position in 0..total {
            // Re-read every iteration: cascades and approvals may have
            // changed later items.
            let Some(item) = array
                .get_items()
                .into_iter()
                .find(|i| i.position == position)
            else {
                continue;
            };
            match item.status {
                ExecutionStatus::Completed
                | ExecutionStatus::Finalized
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled => continue,
                ExecutionStatus::Ready if item.requires_confirmation => {
                    report.awaiting_confirmation = Some(item.id.clone());
                    break;
                }
                ExecutionStatus::Pending if item.requires_confirmation => {
                    // Not planned into readiness yet; nothing to run.
                    report.awaiting_confirmation = Some(item.id.clone());
                    break;
                }
                ExecutionStatus::Pending | ExecutionStatus::Ready => {
                    // An unsatisfied (e.g. forward) dependency leaves the
                    // item pending; skip it, don't abort the run.
                    match array.update_status(&item.id, ExecutionStatus::Executing, None) {
                        Ok(()) => {}
                        Err(ArrayError::UnmetDependency { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                ExecutionStatus::Executing => {}
            }

            let current = array
                .get_items()
                .into_iter()
                .find(|i| i.position == position)
                .ok_or_else(|| anyhow!("item at position {position} disappeared"))?;
            match self.submitter.submit(&current).await {
                Ok(result) => {
                    array.set_result(&current.id, result)?;
                    array.update_status(&current.id, ExecutionStatus::Completed, None)?;
                    report.completed += 1;
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    array.update_status(&current.id, ExecutionStatus::Failed, Some(&reason))?;
                    report.failed += 1;
                }
            }
        }

        array.set_executing(false);
        Ok(report)
    }

    /// External approval for a confirmation-gated item.
    pub fn approve(&self, array: &ExecutionArray, item_id: &str) -> Result<(), ArrayError> {
        array.update_status(item_id, ExecutionStatus::Executing, None)
    }

    /// Operator cancellation. Propagates to dependents via the array's
    /// cascade; already-committed effects are not undone.
    pub fn cancel(&self, array: &ExecutionArray, item_id: &str) -> Result<(), ArrayError> {
        array.update_status(item_id, ExecutionStatus::Cancelled, Some("cancelled by operator"))
    }
}

fn batch_item(item: &ExecutionItem) -> Result<BatchItem> {
    let operation_bytes = str_param(item, "operationBytes")?;
    let sender_address = str_param(item, "senderAddress")?;
    Ok(BatchItem {
        operation_bytes: operation_bytes.to_string(),
        sender_address: sender_address.to_string(),
        description: item.capability.clone(),
    })
}

fn str_param<'a>(item: &'a ExecutionItem, key: &str) -> Result<&'a str> {
    item.params
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| {
            format!(
                "transaction item '{}' ({}) missing string param '{}'",
                item.id, item.capability, key
            )
        })
}
