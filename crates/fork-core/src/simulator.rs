//! Simulation pipeline.
//!
//! [`Simulator`] drives the full flow for one request: validate input
//! before any resource is acquired, fork, dry-run, classify, extract
//! balance deltas, estimate the fee, and release the fork on every exit
//! path. Sequential batches share exactly one fork and commit each
//! operation into a block so later operations observe earlier effects.

use std::sync::Arc;

use fork_sandbox_types::{from_planck, parse_hex_bytes, public_key, AccountId};
use fork_transport::select_endpoints;

use crate::backend::ForkProvider;
use crate::balance::compute_balance_deltas;
use crate::classify::{classify_error, verdict, Phase};
use crate::envelope::{extract_call, mock_signed_envelope};
use crate::errors::SimulatorError;
use crate::fork::{BuildMode, ChainFork, ForkSpec};
use crate::logging::SimulationLog;
use crate::request::{
    BatchSimulationRequest, SequentialSimulationResult, SimulationRequest, SimulationResult,
    StepResult,
};

pub struct Simulator {
    provider: Arc<dyn ForkProvider>,
    build_mode: BuildMode,
    log: Arc<SimulationLog>,
}

struct ParsedItem {
    operation: Vec<u8>,
    sender_id: AccountId,
    sender_address: String,
    description: String,
}

impl Simulator {
    pub fn new(provider: Arc<dyn ForkProvider>, build_mode: BuildMode, log: Arc<SimulationLog>) -> Self {
        Simulator {
            provider,
            build_mode,
            log,
        }
    }

    pub fn log(&self) -> &Arc<SimulationLog> {
        &self.log
    }

    /// Simulate one operation against a fresh fork.
    ///
    /// Classified operation failures come back inside the result value;
    /// an `Err` means the request was rejected up front or the fork
    /// infrastructure itself failed.
    pub async fn simulate(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, SimulatorError> {
        let endpoints = select_endpoints(&request.endpoints)?;
        let operation = parse_hex_bytes(&request.operation_bytes, "operation bytes")
            .map_err(|e| SimulatorError::InvalidRequest(format!("{e:#}")))?;
        if operation.len() < 2 {
            return Err(SimulatorError::InvalidRequest(
                "operation bytes too short to be a call".to_string(),
            ));
        }
        let sender_id = public_key(&request.sender_address)
            .map_err(|e| SimulatorError::InvalidRequest(format!("{e:#}")))?;
        let block_hash = parse_block_hash(request.block_hash.as_deref())?;

        let spec = ForkSpec {
            endpoints,
            block_hash,
        };
        let fork = self
            .provider
            .fork(&spec)
            .await
            .map_err(SimulatorError::Infrastructure)?;
        let result = self
            .simulate_on_fork(&fork, &operation, &sender_id, &request.sender_address)
            .await;
        release(fork).await;
        result
    }

    /// Simulate an ordered batch on one shared fork, committing each
    /// operation into a block so the next one sees its effects.
    pub async fn simulate_sequential(
        &self,
        request: &BatchSimulationRequest,
    ) -> Result<SequentialSimulationResult, SimulatorError> {
        let endpoints = select_endpoints(&request.endpoints)?;
        if request.items.is_empty() {
            return Err(SimulatorError::EmptyBatch);
        }
        let mut items = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.iter().enumerate() {
            let operation = parse_hex_bytes(&item.operation_bytes, "operation bytes")
                .map_err(|e| SimulatorError::InvalidRequest(format!("item {}: {:#}", index, e)))?;
            let sender_id = public_key(&item.sender_address)
                .map_err(|e| SimulatorError::InvalidRequest(format!("item {}: {:#}", index, e)))?;
            items.push(ParsedItem {
                operation,
                sender_id,
                sender_address: item.sender_address.clone(),
                description: item.description.clone(),
            });
        }

        let spec = ForkSpec {
            endpoints,
            block_hash: None,
        };
        let fork = self
            .provider
            .fork(&spec)
            .await
            .map_err(SimulatorError::Infrastructure)?;
        let result = self.run_batch(&fork, &items).await;
        release(fork).await;
        result
    }

    async fn simulate_on_fork(
        &self,
        fork: &ChainFork,
        operation: &[u8],
        sender_id: &AccountId,
        sender_address: &str,
    ) -> Result<SimulationResult, SimulatorError> {
        let info = fork.chain_info().clone();
        let meta = fork.error_metadata().await;

        // Operation bytes may be a bare call or a full signed envelope.
        let (dry_extrinsic, call) = match extract_call(operation) {
            Ok(decoded) => (operation.to_vec(), decoded.call),
            Err(_) => {
                let nonce = fork
                    .account_nonce(sender_id)
                    .await
                    .map_err(SimulatorError::Infrastructure)?;
                let head = fork.head().await.map_err(SimulatorError::Infrastructure)?;
                let envelope = mock_signed_envelope(operation, sender_id, nonce, 0, &head.hash);
                (envelope, operation.to_vec())
            }
        };

        let outcome = fork
            .dry_run(&dry_extrinsic)
            .await
            .map_err(SimulatorError::Infrastructure)?;
        let v = verdict(&outcome, &meta);
        if let Some(reason) = &v.failure_reason {
            let decision = classify_error(reason, Phase::DryRun, &info.chain_name);
            self.log
                .record(Phase::DryRun, &info.chain_name, reason, &decision);
        }
        let balance_changes = compute_balance_deltas(sender_id, &outcome.storage_diff, info.decimals);

        let (fee, fee_error) = match fork.estimate_fee(&call, sender_address).await {
            Ok(fee) => (fee, None),
            Err(e) => {
                let message = format!("{e:#}");
                let decision = classify_error(&message, Phase::FeeEstimation, &info.chain_name);
                self.log
                    .record(Phase::FeeEstimation, &info.chain_name, &message, &decision);
                if decision.ignore {
                    // Known fork artifact: fall back to a zero fee.
                    (0, None)
                } else {
                    (0, Some(format!("fee estimation failed: {}", message)))
                }
            }
        };

        Ok(SimulationResult {
            success: v.succeeded && fee_error.is_none(),
            error: v.failure_reason.or(fee_error),
            estimated_fee: from_planck(fee, info.decimals),
            balance_changes,
            events: outcome.events,
        })
    }

    async fn run_batch(
        &self,
        fork: &ChainFork,
        items: &[ParsedItem],
    ) -> Result<SequentialSimulationResult, SimulatorError> {
        let info = fork.chain_info().clone();
        let meta = fork.error_metadata().await;
        let mut results: Vec<StepResult> = Vec::with_capacity(items.len());
        let mut total_fee: u128 = 0;
        let mut included_total: u32 = 0;

        for (index, item) in items.iter().enumerate() {
            let call = match extract_call(&item.operation) {
                Ok(decoded) => decoded.call,
                Err(_) => item.operation.clone(),
            };
            // Re-sign against the fork's current nonce and head: earlier
            // committed items have already advanced both.
            let nonce = fork
                .account_nonce(&item.sender_id)
                .await
                .map_err(SimulatorError::Infrastructure)?;
            let head = fork.head().await.map_err(SimulatorError::Infrastructure)?;
            let envelope = mock_signed_envelope(&call, &item.sender_id, nonce, 0, &head.hash);

            let outcome = fork
                .dry_run(&envelope)
                .await
                .map_err(SimulatorError::Infrastructure)?;
            let v = verdict(&outcome, &meta);
            if let Some(reason) = &v.failure_reason {
                let decision = classify_error(reason, Phase::DryRun, &info.chain_name);
                self.log
                    .record(Phase::DryRun, &info.chain_name, reason, &decision);
                if !decision.ignore {
                    results.push(failed_step(
                        index,
                        item,
                        reason.clone(),
                        compute_balance_deltas(&item.sender_id, &outcome.storage_diff, info.decimals),
                        outcome.events,
                    ));
                    return Ok(stopped(results, index, item, reason, total_fee, &info));
                }
            }

            let fee = match fork.estimate_fee(&call, &item.sender_address).await {
                Ok(fee) => fee,
                Err(e) => {
                    let message = format!("{e:#}");
                    let decision = classify_error(&message, Phase::FeeEstimation, &info.chain_name);
                    self.log
                        .record(Phase::FeeEstimation, &info.chain_name, &message, &decision);
                    if decision.ignore {
                        0
                    } else {
                        let reason = format!("fee estimation failed: {}", message);
                        results.push(failed_step(index, item, reason.clone(), Vec::new(), Vec::new()));
                        return Ok(stopped(results, index, item, &reason, total_fee, &info));
                    }
                }
            };

            let applied = fork
                .apply_extrinsic(&envelope)
                .await
                .map_err(SimulatorError::Infrastructure)?;
            if !applied.included {
                let reason = applied
                    .reason
                    .unwrap_or_else(|| "operation was not included in the block".to_string());
                let decision = classify_error(&reason, Phase::BlockInclusion, &info.chain_name);
                self.log
                    .record(Phase::BlockInclusion, &info.chain_name, &reason, &decision);
                results.push(failed_step(index, item, reason.clone(), Vec::new(), applied.events));
                return Ok(stopped(results, index, item, &reason, total_fee, &info));
            }
            included_total += 1;

            if self.build_mode == BuildMode::Instant {
                let sealed = fork
                    .seal_block()
                    .await
                    .map_err(SimulatorError::Infrastructure)?;
                if sealed.extrinsic_count == 0 {
                    return Err(SimulatorError::BlockMissedOperations {
                        expected: 1,
                        included: 0,
                    });
                }
            }

            total_fee += fee;
            results.push(StepResult {
                index,
                description: item.description.clone(),
                result: SimulationResult {
                    success: true,
                    error: applied.reason,
                    estimated_fee: from_planck(fee, info.decimals),
                    balance_changes: compute_balance_deltas(
                        &item.sender_id,
                        &applied.storage_diff,
                        info.decimals,
                    ),
                    events: applied.events,
                },
            });
        }

        if self.build_mode == BuildMode::Batch {
            let sealed = fork
                .seal_block()
                .await
                .map_err(SimulatorError::Infrastructure)?;
            if sealed.extrinsic_count != included_total {
                return Err(SimulatorError::BlockMissedOperations {
                    expected: included_total,
                    included: sealed.extrinsic_count,
                });
            }
        }

        Ok(SequentialSimulationResult {
            success: true,
            error: None,
            results,
            total_estimated_fee: from_planck(total_fee, info.decimals),
        })
    }
}

/// Release a fork, logging (never propagating) a cleanup failure.
async fn release(fork: ChainFork) {
    let chain = fork.chain_info().chain_name.clone();
    if let Err(e) = fork.release().await {
        tracing::warn!(chain, "fork release failed: {e:#}");
    }
}

fn parse_block_hash(raw: Option<&str>) -> Result<Option<[u8; 32]>, SimulatorError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let bytes = parse_hex_bytes(raw, "block hash")
        .map_err(|e| SimulatorError::InvalidRequest(format!("{e:#}")))?;
    let hash: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SimulatorError::InvalidRequest("block hash must be 32 bytes".to_string()))?;
    Ok(Some(hash))
}

fn failed_step(
    index: usize,
    item: &ParsedItem,
    reason: String,
    balance_changes: Vec<crate::balance::BalanceChange>,
    events: Vec<String>,
) -> StepResult {
    StepResult {
        index,
        description: item.description.clone(),
        result: SimulationResult {
            success: false,
            error: Some(reason),
            estimated_fee: "0".to_string(),
            balance_changes,
            events,
        },
    }
}

fn stopped(
    results: Vec<StepResult>,
    index: usize,
    item: &ParsedItem,
    reason: &str,
    total_fee: u128,
    info: &crate::fork::ChainInfo,
) -> SequentialSimulationResult {
    SequentialSimulationResult {
        success: false,
        error: Some(format!(
            "step {} ({}) failed: {}",
            index, item.description, reason
        )),
        results,
        total_estimated_fee: from_planck(total_fee, info.decimals),
    }
}
