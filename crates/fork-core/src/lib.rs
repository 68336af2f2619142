//! Chain-fork simulation engine.
//!
//! Forks a live Substrate-style network into a disposable overlay,
//! dry-runs operations against it, commits them into blocks for
//! sequential batches, and turns raw outcomes into classified results
//! with fee estimates and balance deltas. Nothing here ever touches the
//! real chain.
//!
//! # Layering
//!
//! - [`outcome`], [`envelope`], [`balance`], [`fee`], [`hashing`]: wire
//!   formats and pure extraction.
//! - [`classify`]: outcome verdicts and the benign-artifact policy.
//! - [`backend`], [`fork`]: the fork handle and its backend seam.
//! - [`simulator`]: the pipeline gluing the above together.

pub mod backend;
pub mod balance;
pub mod calls;
pub mod classify;
pub mod envelope;
pub mod errors;
pub mod fee;
pub mod fork;
pub mod hashing;
pub mod logging;
pub mod outcome;
pub mod request;
pub mod simulator;

pub use backend::{
    standard_error_metadata, AppliedOperation, ForkBackend, ForkProvider, HandleStats, MockBackend,
    MockProvider, SealedBlock,
};
pub use balance::{
    account_storage_key, compute_balance_deltas, AccountData, AccountInfo, BalanceChange, Direction,
};
pub use calls::{CallConstructor, CallRegistry};
pub use classify::{
    classify_error, render_dispatch_error, verdict, ErrorClassification, ErrorDescriptor,
    ErrorMetadata, Phase, Severity, Verdict,
};
pub use envelope::{extract_call, mock_signed_envelope, DecodedOperation};
pub use errors::SimulatorError;
pub use fee::{decode_partial_fee, query_info_args, DispatchClass, RuntimeDispatchInfo, Weight, QUERY_INFO};
pub use fork::{BuildMode, ChainFork, ChainInfo, ForkSpec, HeadInfo};
pub use logging::{SimLogRecord, SimulationLog};
pub use outcome::{
    ArithmeticError, DiffEntry, DispatchError, DispatchOutcome, DryRunOutcome, InvalidTransaction,
    ModuleError, StorageDiff, TokenError, TransactionValidity, TransactionValidityError,
    UnknownTransaction, ValidTransaction,
};
pub use request::{
    BatchItem, BatchSimulationRequest, SequentialSimulationResult, SimulationRequest,
    SimulationResult, StepResult,
};
pub use simulator::Simulator;
