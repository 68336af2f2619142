//! Chain fork handle.
//!
//! A [`ChainFork`] exclusively owns one disposable forked-chain backend
//! for the duration of one simulation call. All backend access goes
//! through a per-handle async mutex: steps against one fork depend on
//! the state committed by the previous step, so no two operations on
//! the same handle may overlap. Unrelated forks run fully in parallel.
//!
//! Release is guaranteed: callers release explicitly on every exit path,
//! and `Drop` backstops the case where an error unwound past them. A
//! failed release is logged, never allowed to mask the primary result.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use fork_sandbox_types::{decode_ss58, reencode_ss58, AccountId};

use crate::backend::{AppliedOperation, ForkBackend, SealedBlock};
use crate::classify::ErrorMetadata;
use crate::envelope::mock_signed_envelope;
use crate::fee::{decode_partial_fee, query_info_args, QUERY_INFO};
use crate::outcome::DryRunOutcome;

/// What to fork: the candidate endpoints and an optional pin to a
/// specific block (current head when unspecified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSpec {
    pub endpoints: Vec<String>,
    pub block_hash: Option<[u8; 32]>,
}

/// How sequential simulation commits operations: one sealed block per
/// operation, or one block for the whole batch. Consumed once at
/// simulator construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Instant,
    Batch,
}

/// Identity of the chain a fork was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain_name: String,
    pub ss58_format: u16,
    pub decimals: u8,
    pub spec_version: u32,
    pub tx_version: u32,
    pub genesis_hash: [u8; 32],
}

/// The fork's current head block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub hash: [u8; 32],
    pub number: u32,
}

/// Exclusively-owned handle over one forked-chain backend.
pub struct ChainFork {
    info: ChainInfo,
    backend: Mutex<Box<dyn ForkBackend>>,
    released: AtomicBool,
}

impl ChainFork {
    pub fn new(info: ChainInfo, backend: Box<dyn ForkBackend>) -> Self {
        ChainFork {
            info,
            backend: Mutex::new(backend),
            released: AtomicBool::new(false),
        }
    }

    pub fn chain_info(&self) -> &ChainInfo {
        &self.info
    }

    pub async fn head(&self) -> Result<HeadInfo> {
        self.backend.lock().await.head()
    }

    /// Execute against the fork head without committing a block.
    pub async fn dry_run(&self, extrinsic: &[u8]) -> Result<DryRunOutcome> {
        self.backend.lock().await.dry_run(extrinsic).await
    }

    /// Apply an extrinsic to the fork's pending block.
    pub async fn apply_extrinsic(&self, extrinsic: &[u8]) -> Result<AppliedOperation> {
        self.backend.lock().await.apply_extrinsic(extrinsic).await
    }

    /// Seal the pending block, advancing the fork head.
    pub async fn seal_block(&self) -> Result<SealedBlock> {
        self.backend.lock().await.seal_block().await
    }

    pub async fn runtime_call(&self, method: &str, args: &[u8]) -> Result<Vec<u8>> {
        self.backend.lock().await.runtime_call(method, args).await
    }

    pub async fn storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.backend.lock().await.storage(key).await
    }

    pub async fn account_nonce(&self, account: &AccountId) -> Result<u32> {
        self.backend.lock().await.account_nonce(account)
    }

    pub async fn error_metadata(&self) -> ErrorMetadata {
        self.backend.lock().await.error_metadata()
    }

    /// Estimate the fee for a call signed by `sender`.
    ///
    /// The sender address is re-encoded in the fork's own SS58 format
    /// first; a format mismatch here fails silently on real runtimes
    /// rather than loudly, so normalization is explicit.
    pub async fn estimate_fee(&self, call: &[u8], sender: &str) -> Result<u128> {
        let normalized = reencode_ss58(sender, self.info.ss58_format)?;
        let (_, account) = decode_ss58(&normalized)?;
        let nonce = self.account_nonce(&account).await?;
        let envelope =
            mock_signed_envelope(call, &account, nonce, 0, &self.info.genesis_hash);
        let raw = self
            .runtime_call(QUERY_INFO, &query_info_args(&envelope))
            .await?;
        decode_partial_fee(&raw)
    }

    /// Release the backend: close the overlay database and drop the
    /// network connection. Consumes the handle; double release through
    /// `Drop` is a no-op.
    pub async fn release(self) -> Result<()> {
        let mut backend = self.backend.lock().await;
        let result = backend.release();
        drop(backend);
        self.released.store(true, Ordering::SeqCst);
        result
    }
}

impl Drop for ChainFork {
    fn drop(&mut self) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        // Unreleased handle unwinding past its owner. Backend release is
        // synchronous and idempotent, so the backstop is safe here.
        match self.backend.try_lock() {
            Ok(mut backend) => {
                if let Err(e) = backend.release() {
                    tracing::warn!(chain = %self.info.chain_name, "fork release failed in drop: {e:#}");
                }
            }
            Err(_) => {
                tracing::warn!(chain = %self.info.chain_name, "fork dropped while backend was locked");
            }
        }
    }
}
