//! Dispatch and validity outcome model.
//!
//! These mirror the runtime's SCALE-encoded outcome types closely enough
//! to decode what a forked node returns: transaction-pool validity
//! (`TransactionValidity`) and post-dispatch results (`DispatchOutcome`).
//! Variant indices match the runtime encoding and must not be reordered.

use codec::{Decode, Encode};

// ============================================================================
// Transaction validity (pre-dispatch)
// ============================================================================

/// Pool-level validity verdict, encoded as a SCALE `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum TransactionValidity {
    #[codec(index = 0)]
    Valid(ValidTransaction),
    #[codec(index = 1)]
    Invalid(TransactionValidityError),
}

impl TransactionValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, TransactionValidity::Valid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ValidTransaction {
    pub priority: u64,
    pub requires: Vec<Vec<u8>>,
    pub provides: Vec<Vec<u8>>,
    pub longevity: u64,
    pub propagate: bool,
}

impl Default for ValidTransaction {
    fn default() -> Self {
        ValidTransaction {
            priority: 0,
            requires: Vec::new(),
            provides: Vec::new(),
            longevity: u64::MAX,
            propagate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum TransactionValidityError {
    #[codec(index = 0)]
    Invalid(InvalidTransaction),
    #[codec(index = 1)]
    Unknown(UnknownTransaction),
}

impl TransactionValidityError {
    /// Human-readable rejection reason.
    pub fn reason(&self) -> String {
        match self {
            TransactionValidityError::Invalid(e) => e.reason(),
            TransactionValidityError::Unknown(e) => e.reason(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum InvalidTransaction {
    #[codec(index = 0)]
    Call,
    #[codec(index = 1)]
    Payment,
    #[codec(index = 2)]
    Future,
    #[codec(index = 3)]
    Stale,
    #[codec(index = 4)]
    BadProof,
    #[codec(index = 5)]
    AncientBirthBlock,
    #[codec(index = 6)]
    ExhaustsResources,
    #[codec(index = 7)]
    Custom(u8),
    #[codec(index = 8)]
    BadMandatory,
    #[codec(index = 9)]
    MandatoryValidation,
    #[codec(index = 10)]
    BadSigner,
}

impl InvalidTransaction {
    pub fn reason(&self) -> String {
        match self {
            InvalidTransaction::Call => "call is not expected by the runtime".to_string(),
            InvalidTransaction::Payment => {
                "inability to pay some fees (e.g. account balance too low)".to_string()
            }
            InvalidTransaction::Future => "transaction nonce is in the future".to_string(),
            InvalidTransaction::Stale => "transaction is outdated (stale nonce)".to_string(),
            InvalidTransaction::BadProof => "bad signature in extrinsic".to_string(),
            InvalidTransaction::AncientBirthBlock => "transaction birth block is ancient".to_string(),
            InvalidTransaction::ExhaustsResources => {
                "transaction would exhaust block resources".to_string()
            }
            InvalidTransaction::Custom(n) => format!("invalid transaction (custom code {})", n),
            InvalidTransaction::BadMandatory => "mandatory dispatch produced an error".to_string(),
            InvalidTransaction::MandatoryValidation => {
                "transaction is only valid as an inherent".to_string()
            }
            InvalidTransaction::BadSigner => "invalid signing address".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum UnknownTransaction {
    #[codec(index = 0)]
    CannotLookup,
    #[codec(index = 1)]
    NoUnsignedValidator,
    #[codec(index = 2)]
    Custom(u8),
}

impl UnknownTransaction {
    pub fn reason(&self) -> String {
        match self {
            UnknownTransaction::CannotLookup => {
                "could not look up information required to validate the transaction".to_string()
            }
            UnknownTransaction::NoUnsignedValidator => {
                "no validator found for the unsigned transaction".to_string()
            }
            UnknownTransaction::Custom(n) => format!("unknown transaction (custom code {})", n),
        }
    }
}

// ============================================================================
// Dispatch results (post-execution)
// ============================================================================

/// Result of dispatching an included extrinsic, encoded as a SCALE `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum DispatchOutcome {
    #[codec(index = 0)]
    Success,
    #[codec(index = 1)]
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum DispatchError {
    #[codec(index = 0)]
    Other,
    #[codec(index = 1)]
    CannotLookup,
    #[codec(index = 2)]
    BadOrigin,
    #[codec(index = 3)]
    Module(ModuleError),
    #[codec(index = 4)]
    ConsumerRemaining,
    #[codec(index = 5)]
    NoProviders,
    #[codec(index = 6)]
    TooManyConsumers,
    #[codec(index = 7)]
    Token(TokenError),
    #[codec(index = 8)]
    Arithmetic(ArithmeticError),
}

/// Pallet-level error: pallet index plus the runtime's 4-byte error value
/// (first byte is the error variant index within the pallet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ModuleError {
    pub index: u8,
    pub error: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum TokenError {
    #[codec(index = 0)]
    FundsUnavailable,
    #[codec(index = 1)]
    OnlyProvider,
    #[codec(index = 2)]
    BelowMinimum,
    #[codec(index = 3)]
    CannotCreate,
    #[codec(index = 4)]
    UnknownAsset,
    #[codec(index = 5)]
    Frozen,
    #[codec(index = 6)]
    Unsupported,
}

impl TokenError {
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::FundsUnavailable => "funds are unavailable",
            TokenError::OnlyProvider => "account that must exist would die",
            TokenError::BelowMinimum => "balance would fall below the existential deposit",
            TokenError::CannotCreate => "account cannot be created",
            TokenError::UnknownAsset => "asset is not known",
            TokenError::Frozen => "funds are frozen",
            TokenError::Unsupported => "operation is not supported for this asset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ArithmeticError {
    #[codec(index = 0)]
    Underflow,
    #[codec(index = 1)]
    Overflow,
    #[codec(index = 2)]
    DivisionByZero,
}

impl ArithmeticError {
    pub fn reason(&self) -> &'static str {
        match self {
            ArithmeticError::Underflow => "arithmetic underflow",
            ArithmeticError::Overflow => "arithmetic overflow",
            ArithmeticError::DivisionByZero => "division by zero",
        }
    }
}

// ============================================================================
// Speculative-execution output
// ============================================================================

/// Everything a dry-run against the fork head reports: pool validity, the
/// dispatch result when the operation got far enough to execute, and the
/// storage writes the speculative execution would have produced.
#[derive(Debug, Clone)]
pub struct DryRunOutcome {
    pub validity: TransactionValidity,
    pub dispatch: Option<DispatchOutcome>,
    pub storage_diff: StorageDiff,
    pub events: Vec<String>,
}

/// Set of storage entries touched by one speculative or committed
/// execution, with before/after values (`None` = entry absent).
#[derive(Debug, Clone, Default)]
pub struct StorageDiff {
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub key: Vec<u8>,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

impl StorageDiff {
    pub fn push(&mut self, key: Vec<u8>, before: Option<Vec<u8>>, after: Option<Vec<u8>>) {
        self.entries.push(DiffEntry { key, before, after });
    }

    pub fn get(&self, key: &[u8]) -> Option<&DiffEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
