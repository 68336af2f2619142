//! Fork backend abstraction and test doubles.
//!
//! [`ForkBackend`] is the seam between the simulation pipeline and
//! whatever actually hosts the forked chain state (an embedded overlay
//! database over a live RPC connection in production). [`MockBackend`]
//! is a deterministic in-memory stand-in that models `System.Account`
//! ledger entries, balance transfers, nonces and fees closely enough to
//! exercise every pipeline path, including injected failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use codec::{Compact, Decode, Encode};

use fork_sandbox_types::{public_key, AccountId};
use fork_transport::network_by_name;

use crate::balance::{account_storage_key, AccountData, AccountInfo};
use crate::classify::ErrorMetadata;
use crate::envelope::extract_call;
use crate::fee::{DispatchClass, RuntimeDispatchInfo, Weight, QUERY_INFO};
use crate::fork::{ChainFork, ChainInfo, ForkSpec, HeadInfo};
use crate::hashing::blake2_256;
use crate::outcome::{
    DispatchError, DispatchOutcome, DryRunOutcome, InvalidTransaction, ModuleError, StorageDiff,
    TransactionValidity, TransactionValidityError, UnknownTransaction, ValidTransaction,
};

// ============================================================================
// Backend and provider traits
// ============================================================================

/// Result of applying one extrinsic to the fork's pending block.
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    /// Whether the extrinsic made it into the pending block at all.
    /// Included-but-dispatch-failed operations still carry a reason.
    pub included: bool,
    pub reason: Option<String>,
    pub storage_diff: StorageDiff,
    pub events: Vec<String>,
}

/// A block sealed on the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedBlock {
    pub hash: [u8; 32],
    pub number: u32,
    pub extrinsic_count: u32,
}

/// One disposable forked-chain state host.
///
/// `release` is synchronous and idempotent so the handle's drop path can
/// call it without an executor.
#[async_trait]
pub trait ForkBackend: Send {
    fn chain_info(&self) -> ChainInfo;
    fn head(&self) -> Result<HeadInfo>;
    async fn dry_run(&mut self, extrinsic: &[u8]) -> Result<DryRunOutcome>;
    async fn apply_extrinsic(&mut self, extrinsic: &[u8]) -> Result<AppliedOperation>;
    async fn seal_block(&mut self) -> Result<SealedBlock>;
    async fn runtime_call(&mut self, method: &str, args: &[u8]) -> Result<Vec<u8>>;
    async fn storage(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn account_nonce(&self, account: &AccountId) -> Result<u32>;
    fn error_metadata(&self) -> ErrorMetadata;
    fn release(&mut self) -> Result<()>;
}

/// Creates fork handles. One provider serves many unrelated forks.
#[async_trait]
pub trait ForkProvider: Send + Sync {
    async fn fork(&self, spec: &ForkSpec) -> Result<ChainFork>;
}

/// Acquire/release bookkeeping shared between a provider and every
/// backend it hands out.
#[derive(Debug, Default)]
pub struct HandleStats {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl HandleStats {
    pub fn outstanding(&self) -> usize {
        self.acquired
            .load(Ordering::SeqCst)
            .saturating_sub(self.released.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Mock backend
// ============================================================================

const SYSTEM_PALLET: u8 = 0;
const REMARK_CALL: u8 = 0;
const BALANCES_PALLET: u8 = 5;
const TRANSFER_ALLOW_DEATH: u8 = 0;
const TRANSFER_KEEP_ALIVE: u8 = 3;

/// Error metadata matching the mock runtime's balances pallet.
pub fn standard_error_metadata() -> ErrorMetadata {
    let mut meta = ErrorMetadata::default();
    meta.insert(
        BALANCES_PALLET,
        2,
        "balances",
        "InsufficientBalance",
        "Balance too low to send value.",
    );
    meta.insert(
        BALANCES_PALLET,
        3,
        "balances",
        "ExistentialDeposit",
        "Value too low to create account due to existential deposit.",
    );
    meta.insert(
        BALANCES_PALLET,
        4,
        "balances",
        "Expendability",
        "Transfer or payment would kill the account.",
    );
    meta
}

/// Deterministic in-memory fork state.
#[derive(Clone)]
pub struct MockBackend {
    info: ChainInfo,
    head: HeadInfo,
    accounts: HashMap<AccountId, AccountInfo>,
    pending: Vec<Vec<u8>>,
    fee_base: u128,
    fee_per_byte: u128,
    existential_deposit: u128,
    fail_fee_estimation: bool,
    drop_sealed_extrinsics: bool,
    forced_dispatch_error: Option<DispatchError>,
    meta: ErrorMetadata,
    stats: Arc<HandleStats>,
    released: bool,
}

impl MockBackend {
    pub fn new(network: &str) -> Result<Self> {
        let Some(net) = network_by_name(network) else {
            bail!("unknown network '{}'", network);
        };
        let genesis_hash = blake2_256(format!("{}-mock-genesis", net.name).as_bytes());
        Ok(MockBackend {
            info: ChainInfo {
                chain_name: net.name.to_string(),
                ss58_format: net.ss58_format,
                decimals: net.decimals,
                spec_version: 1_010_000,
                tx_version: 26,
                genesis_hash,
            },
            head: HeadInfo {
                hash: blake2_256(format!("{}-mock-head", net.name).as_bytes()),
                number: 100,
            },
            accounts: HashMap::new(),
            pending: Vec::new(),
            fee_base: 1_000_000,
            fee_per_byte: 1_000,
            existential_deposit: 10_000_000_000,
            fail_fee_estimation: false,
            drop_sealed_extrinsics: false,
            forced_dispatch_error: None,
            meta: standard_error_metadata(),
            stats: Arc::new(HandleStats::default()),
            released: false,
        })
    }

    pub fn westend() -> Self {
        MockBackend::new("westend").unwrap()
    }

    pub fn with_account(mut self, address: &str, free: u128, nonce: u32) -> Result<Self> {
        let account = public_key(address)?;
        self.accounts.insert(
            account,
            AccountInfo {
                nonce,
                providers: 1,
                data: AccountData {
                    free,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        Ok(self)
    }

    pub fn with_fee_schedule(mut self, base: u128, per_byte: u128) -> Self {
        self.fee_base = base;
        self.fee_per_byte = per_byte;
        self
    }

    pub fn with_existential_deposit(mut self, deposit: u128) -> Self {
        self.existential_deposit = deposit;
        self
    }

    /// Make `TransactionPaymentApi_query_info` unavailable, as it is on
    /// forks of runtimes that predate the payment API.
    pub fn failing_fee_estimation(mut self) -> Self {
        self.fail_fee_estimation = true;
        self
    }

    /// Make sealed blocks silently lose their extrinsics, modelling a
    /// block author that dropped the pending queue.
    pub fn dropping_sealed_extrinsics(mut self) -> Self {
        self.drop_sealed_extrinsics = true;
        self
    }

    /// Force every dispatch to fail with the given error.
    pub fn forcing_dispatch_error(mut self, err: DispatchError) -> Self {
        self.forced_dispatch_error = Some(err);
        self
    }

    pub fn free_balance(&self, account: &AccountId) -> u128 {
        self.accounts.get(account).map_or(0, |a| a.data.free)
    }

    fn fee_for(&self, encoded_len: usize) -> u128 {
        self.fee_base + encoded_len as u128 * self.fee_per_byte
    }

    /// Execute an extrinsic against current state without mutating it.
    /// Returns the observable outcome plus, when the extrinsic would be
    /// included in a block, the account writes to commit.
    fn evaluate(&self, extrinsic: &[u8]) -> (DryRunOutcome, Option<CommitPlan>) {
        let decoded = match extract_call(extrinsic) {
            Ok(d) => d,
            Err(_) => return (invalid(InvalidTransaction::Call), None),
        };
        let Some(signer) = decoded.signer else {
            return (
                DryRunOutcome {
                    validity: TransactionValidity::Invalid(TransactionValidityError::Unknown(
                        UnknownTransaction::NoUnsignedValidator,
                    )),
                    dispatch: None,
                    storage_diff: StorageDiff::default(),
                    events: Vec::new(),
                },
                None,
            );
        };

        let Some(sender) = self.accounts.get(&signer).copied() else {
            return (invalid(InvalidTransaction::Payment), None);
        };
        if let Some(nonce) = decoded.nonce {
            if nonce < sender.nonce {
                return (invalid(InvalidTransaction::Stale), None);
            }
            if nonce > sender.nonce {
                return (invalid(InvalidTransaction::Future), None);
            }
        }
        let fee = self.fee_for(extrinsic.len());
        if sender.data.free < fee {
            return (invalid(InvalidTransaction::Payment), None);
        }

        // Fee and nonce are committed even when the dispatch itself fails.
        let mut sender_after = sender;
        sender_after.nonce += 1;
        sender_after.data.free -= fee;

        let dispatch = match (decoded.call.first(), decoded.call.get(1)) {
            (Some(&SYSTEM_PALLET), Some(&REMARK_CALL)) => {
                self.forced_dispatch_error
                    .clone()
                    .map_or(Dispatched::Success(Vec::new()), Dispatched::Failed)
            }
            (Some(&BALANCES_PALLET), Some(&call))
                if call == TRANSFER_ALLOW_DEATH || call == TRANSFER_KEEP_ALIVE =>
            {
                match decode_transfer(&decoded.call[2..]) {
                    Some((dest, value)) => self.dispatch_transfer(
                        signer,
                        &sender_after,
                        dest,
                        value,
                        call == TRANSFER_KEEP_ALIVE,
                    ),
                    None => return (invalid(InvalidTransaction::Call), None),
                }
            }
            _ => return (invalid(InvalidTransaction::Call), None),
        };

        let (outcome_dispatch, extra_writes, events) = match dispatch {
            Dispatched::Success(writes) => {
                let mut events = vec!["transactionPayment.TransactionFeePaid".to_string()];
                if !writes.is_empty() {
                    events.insert(0, "balances.Transfer".to_string());
                }
                events.push("system.ExtrinsicSuccess".to_string());
                (DispatchOutcome::Success, writes, events)
            }
            Dispatched::Failed(err) => (
                DispatchOutcome::Failed(err),
                Vec::new(),
                vec![
                    "transactionPayment.TransactionFeePaid".to_string(),
                    "system.ExtrinsicFailed".to_string(),
                ],
            ),
        };

        let mut plan = CommitPlan {
            writes: vec![(signer, Some(sender), sender_after)],
        };
        for (account, after) in extra_writes {
            // The transfer dispatch may credit the signer itself.
            if account == signer {
                plan.writes[0].2 = after;
            } else {
                plan.writes
                    .push((account, self.accounts.get(&account).copied(), after));
            }
        }

        let mut diff = StorageDiff::default();
        for (account, before, after) in &plan.writes {
            diff.push(
                account_storage_key(account),
                before.map(|i| i.encode()),
                Some(after.encode()),
            );
        }

        (
            DryRunOutcome {
                validity: TransactionValidity::Valid(ValidTransaction::default()),
                dispatch: Some(outcome_dispatch),
                storage_diff: diff,
                events,
            },
            Some(plan),
        )
    }

    fn dispatch_transfer(
        &self,
        signer: AccountId,
        sender_after_fee: &AccountInfo,
        dest: AccountId,
        value: u128,
        keep_alive: bool,
    ) -> Dispatched {
        if let Some(err) = &self.forced_dispatch_error {
            return Dispatched::Failed(err.clone());
        }
        if sender_after_fee.data.free < value {
            return Dispatched::Failed(module_error(2)); // InsufficientBalance
        }
        if dest == signer {
            // Self-transfer nets out to the fee alone.
            return Dispatched::Success(Vec::new());
        }
        let dest_before = self.accounts.get(&dest).copied().unwrap_or_default();
        let dest_total_after = dest_before.data.total().saturating_add(value);
        if dest_total_after < self.existential_deposit {
            return Dispatched::Failed(module_error(3)); // ExistentialDeposit
        }
        let sender_remaining = sender_after_fee.data.free - value;
        if keep_alive && sender_remaining < self.existential_deposit {
            return Dispatched::Failed(module_error(4)); // Expendability
        }

        let mut sender_final = *sender_after_fee;
        sender_final.data.free = sender_remaining;
        let mut dest_after = dest_before;
        dest_after.providers = dest_after.providers.max(1);
        dest_after.data.free = dest_after.data.free.saturating_add(value);
        Dispatched::Success(vec![(signer, sender_final), (dest, dest_after)])
    }
}

enum Dispatched {
    Success(Vec<(AccountId, AccountInfo)>),
    Failed(DispatchError),
}

struct CommitPlan {
    /// (account, before, after)
    writes: Vec<(AccountId, Option<AccountInfo>, AccountInfo)>,
}

fn invalid(reason: InvalidTransaction) -> DryRunOutcome {
    DryRunOutcome {
        validity: TransactionValidity::Invalid(TransactionValidityError::Invalid(reason)),
        dispatch: None,
        storage_diff: StorageDiff::default(),
        events: Vec::new(),
    }
}

fn module_error(error_index: u8) -> DispatchError {
    DispatchError::Module(ModuleError {
        index: BALANCES_PALLET,
        error: [error_index, 0, 0, 0],
    })
}

fn decode_transfer(mut args: &[u8]) -> Option<(AccountId, u128)> {
    let variant = u8::decode(&mut args).ok()?;
    if variant != 0 {
        return None;
    }
    let dest = <[u8; 32]>::decode(&mut args).ok()?;
    let value = Compact::<u128>::decode(&mut args).ok()?.0;
    if !args.is_empty() {
        return None;
    }
    Some((dest, value))
}

#[async_trait]
impl ForkBackend for MockBackend {
    fn chain_info(&self) -> ChainInfo {
        self.info.clone()
    }

    fn head(&self) -> Result<HeadInfo> {
        Ok(self.head)
    }

    async fn dry_run(&mut self, extrinsic: &[u8]) -> Result<DryRunOutcome> {
        let (outcome, _) = self.evaluate(extrinsic);
        Ok(outcome)
    }

    async fn apply_extrinsic(&mut self, extrinsic: &[u8]) -> Result<AppliedOperation> {
        let (outcome, plan) = self.evaluate(extrinsic);
        let Some(plan) = plan else {
            let reason = match &outcome.validity {
                TransactionValidity::Invalid(e) => Some(e.reason()),
                TransactionValidity::Valid(_) => None,
            };
            return Ok(AppliedOperation {
                included: false,
                reason,
                storage_diff: StorageDiff::default(),
                events: outcome.events,
            });
        };

        for (account, _, after) in plan.writes {
            self.accounts.insert(account, after);
        }
        self.pending.push(extrinsic.to_vec());

        let reason = match &outcome.dispatch {
            Some(DispatchOutcome::Failed(err)) => {
                Some(crate::classify::render_dispatch_error(err, &self.meta))
            }
            _ => None,
        };
        Ok(AppliedOperation {
            included: true,
            reason,
            storage_diff: outcome.storage_diff,
            events: outcome.events,
        })
    }

    async fn seal_block(&mut self) -> Result<SealedBlock> {
        let extrinsic_count = if self.drop_sealed_extrinsics {
            0
        } else {
            self.pending.len() as u32
        };
        self.pending.clear();
        let number = self.head.number + 1;
        let mut preimage = self.head.hash.to_vec();
        preimage.extend_from_slice(&number.to_le_bytes());
        self.head = HeadInfo {
            hash: blake2_256(&preimage),
            number,
        };
        Ok(SealedBlock {
            hash: self.head.hash,
            number,
            extrinsic_count,
        })
    }

    async fn runtime_call(&mut self, method: &str, args: &[u8]) -> Result<Vec<u8>> {
        if method != QUERY_INFO {
            bail!("runtime API method not found: {}", method);
        }
        if self.fail_fee_estimation {
            bail!("Method not found: {}", QUERY_INFO);
        }
        if args.len() < 4 {
            bail!("malformed {} arguments", QUERY_INFO);
        }
        let extrinsic_len = args.len() - 4;
        let info = RuntimeDispatchInfo {
            weight: Weight {
                ref_time: extrinsic_len as u64 * 1_000,
                proof_size: 0,
            },
            class: DispatchClass::Normal,
            partial_fee: self.fee_for(extrinsic_len),
        };
        Ok(info.encode())
    }

    async fn storage(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .accounts
            .iter()
            .find(|(account, _)| account_storage_key(account) == key)
            .map(|(_, info)| info.encode()))
    }

    fn account_nonce(&self, account: &AccountId) -> Result<u32> {
        Ok(self.accounts.get(account).map_or(0, |a| a.nonce))
    }

    fn error_metadata(&self) -> ErrorMetadata {
        self.meta.clone()
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Mock provider
// ============================================================================

/// Hands out independent clones of a template backend, counting
/// acquisitions and releases.
pub struct MockProvider {
    template: MockBackend,
    stats: Arc<HandleStats>,
    fail_fork: bool,
}

impl MockProvider {
    pub fn new(template: MockBackend) -> Self {
        MockProvider {
            template,
            stats: Arc::new(HandleStats::default()),
            fail_fork: false,
        }
    }

    /// Make every fork attempt fail before a handle is acquired.
    pub fn failing_fork(mut self) -> Self {
        self.fail_fork = true;
        self
    }

    pub fn stats(&self) -> Arc<HandleStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ForkProvider for MockProvider {
    async fn fork(&self, spec: &ForkSpec) -> Result<ChainFork> {
        if self.fail_fork {
            bail!("unable to connect to any endpoint: {:?}", spec.endpoints);
        }
        let mut backend = self.template.clone();
        backend.stats = Arc::clone(&self.stats);
        backend.released = false;
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        let info = backend.chain_info();
        Ok(ChainFork::new(info, Box::new(backend)))
    }
}
