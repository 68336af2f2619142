//! Outcome and error classification.
//!
//! Two concerns live here. [`verdict`] turns a dry-run outcome into a
//! `{succeeded, failure_reason}` pair, rendering module errors through
//! the chain's error metadata. [`classify_error`] decides whether a raw
//! error string encountered in a given phase is a known-benign fork
//! artifact (ignorable) or a genuine failure (blocking). Both are total:
//! every input maps to a definite answer, nothing panics.

use std::collections::HashMap;

use serde::Serialize;

use crate::outcome::{DispatchError, DispatchOutcome, DryRunOutcome, ModuleError, TransactionValidity};

// ============================================================================
// Phases and classification policy
// ============================================================================

/// Where in the simulation pipeline an error surfaced. The same error
/// string can be benign in one phase and blocking in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DryRun,
    FeeEstimation,
    BlockInclusion,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::DryRun => write!(f, "dry-run"),
            Phase::FeeEstimation => write!(f, "fee-estimation"),
            Phase::BlockInclusion => write!(f, "block-inclusion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Policy decision for one observed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    /// True when the error is a benign fork artifact and the pipeline
    /// should continue as if the step succeeded.
    pub ignore: bool,
    pub classification: &'static str,
    pub severity: Severity,
}

impl ErrorClassification {
    fn ignorable(classification: &'static str) -> Self {
        ErrorClassification {
            ignore: true,
            classification,
            severity: Severity::Warning,
        }
    }

    fn blocking(classification: &'static str) -> Self {
        ErrorClassification {
            ignore: false,
            classification,
            severity: Severity::Error,
        }
    }
}

/// Classify a raw error string by phase and chain.
///
/// The benign table is maintained from observed fork behavior: forked
/// runtimes frequently lack the payment-query runtime API, and fee
/// estimation against a public endpoint can time out without implying
/// anything about the operation itself. Unknown errors are blocking.
pub fn classify_error(message: &str, phase: Phase, chain: &str) -> ErrorClassification {
    let lower = message.to_lowercase();
    let chain = chain.to_lowercase();

    if phase == Phase::FeeEstimation {
        if lower.contains("transactionpaymentapi") || lower.contains("method not found") {
            return ErrorClassification::ignorable("fee-api-unavailable");
        }
        if lower.contains("timed out") || lower.contains("timeout") {
            return ErrorClassification::ignorable("fee-estimation-timeout");
        }
        // Westend runtime upgrades have shipped with a stale payment API
        // version that rejects query_info on forks.
        if chain == "westend" && lower.contains("api version") {
            return ErrorClassification::ignorable("fee-api-version-mismatch");
        }
    }

    if lower.contains("inability to pay") || lower.contains("balance too low") {
        return ErrorClassification::blocking("insufficient-balance");
    }
    if lower.contains("stale") || lower.contains("outdated") {
        return ErrorClassification::blocking("stale-nonce");
    }
    if lower.contains("nonce is in the future") {
        return ErrorClassification::blocking("future-nonce");
    }

    ErrorClassification::blocking("unclassified")
}

// ============================================================================
// Dispatch-error rendering
// ============================================================================

/// One pallet error descriptor from the chain's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub section: String,
    pub name: String,
    pub docs: String,
}

/// Lookup table from (pallet index, error index) to descriptors, built
/// from whatever error metadata the forked chain exposes.
#[derive(Debug, Clone, Default)]
pub struct ErrorMetadata {
    entries: HashMap<(u8, u8), ErrorDescriptor>,
}

impl ErrorMetadata {
    pub fn insert(&mut self, pallet: u8, error: u8, section: &str, name: &str, docs: &str) {
        self.entries.insert(
            (pallet, error),
            ErrorDescriptor {
                section: section.to_string(),
                name: name.to_string(),
                docs: docs.to_string(),
            },
        );
    }

    /// Render a module error as `section.name: docs`, falling back to the
    /// raw indices when the chain's metadata has no entry for it.
    pub fn render(&self, err: &ModuleError) -> String {
        match self.entries.get(&(err.index, err.error[0])) {
            Some(d) => format!("{}.{}: {}", d.section, d.name, d.docs),
            None => format!("module error {}/0x{}", err.index, hex::encode(err.error)),
        }
    }
}

/// Render any dispatch error as a human-readable failure reason.
pub fn render_dispatch_error(err: &DispatchError, meta: &ErrorMetadata) -> String {
    match err {
        DispatchError::Module(m) => meta.render(m),
        DispatchError::Token(t) => t.reason().to_string(),
        DispatchError::Arithmetic(a) => a.reason().to_string(),
        DispatchError::Other => "unspecified dispatch error".to_string(),
        DispatchError::CannotLookup => "failed to look up required data".to_string(),
        DispatchError::BadOrigin => "bad origin for this call".to_string(),
        DispatchError::ConsumerRemaining => "account has remaining consumers".to_string(),
        DispatchError::NoProviders => "account has no provider references".to_string(),
        DispatchError::TooManyConsumers => "account has too many consumers".to_string(),
    }
}

// ============================================================================
// Dry-run verdict
// ============================================================================

/// Final call on one dry-run outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

/// Map a dry-run outcome to a verdict. Pool-invalidity wins over any
/// dispatch result; a valid transaction with no dispatch information
/// counts as success (the pool accepted it and nothing executed yet).
pub fn verdict(outcome: &DryRunOutcome, meta: &ErrorMetadata) -> Verdict {
    match &outcome.validity {
        TransactionValidity::Invalid(e) => Verdict {
            succeeded: false,
            failure_reason: Some(e.reason()),
        },
        TransactionValidity::Valid(_) => match &outcome.dispatch {
            Some(DispatchOutcome::Failed(err)) => Verdict {
                succeeded: false,
                failure_reason: Some(render_dispatch_error(err, meta)),
            },
            _ => Verdict {
                succeeded: true,
                failure_reason: None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{
        InvalidTransaction, StorageDiff, TokenError, TransactionValidityError, ValidTransaction,
    };

    fn outcome(validity: TransactionValidity, dispatch: Option<DispatchOutcome>) -> DryRunOutcome {
        DryRunOutcome {
            validity,
            dispatch,
            storage_diff: StorageDiff::default(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_fee_api_gap_ignorable_only_during_fee_estimation() {
        let msg = "Method not found: TransactionPaymentApi_query_info";
        assert!(classify_error(msg, Phase::FeeEstimation, "westend").ignore);
        assert!(!classify_error(msg, Phase::DryRun, "westend").ignore);
        assert!(!classify_error(msg, Phase::BlockInclusion, "westend").ignore);
    }

    #[test]
    fn test_timeout_ignorable_in_fee_estimation() {
        let c = classify_error("request timed out after 30s", Phase::FeeEstimation, "polkadot");
        assert!(c.ignore);
        assert_eq!(c.severity, Severity::Warning);
    }

    #[test]
    fn test_validity_failures_block() {
        let c = classify_error(
            "inability to pay some fees (e.g. account balance too low)",
            Phase::DryRun,
            "kusama",
        );
        assert!(!c.ignore);
        assert_eq!(c.classification, "insufficient-balance");
    }

    #[test]
    fn test_classify_is_total() {
        // Arbitrary garbage still maps to a definite classification.
        for msg in ["", "???", "\u{fffd}\u{fffd}", "panic at the disco"] {
            for phase in [Phase::DryRun, Phase::FeeEstimation, Phase::BlockInclusion] {
                let c = classify_error(msg, phase, "unknown-chain");
                assert!(!c.classification.is_empty());
            }
        }
    }

    #[test]
    fn test_module_error_rendered_from_metadata() {
        let mut meta = ErrorMetadata::default();
        meta.insert(5, 2, "balances", "InsufficientBalance", "Balance too low to send value.");
        let err = ModuleError {
            index: 5,
            error: [2, 0, 0, 0],
        };
        assert_eq!(
            meta.render(&err),
            "balances.InsufficientBalance: Balance too low to send value."
        );

        let unknown = ModuleError {
            index: 9,
            error: [1, 0, 0, 0],
        };
        assert_eq!(meta.render(&unknown), "module error 9/0x01000000");
    }

    #[test]
    fn test_verdict_precedence() {
        let meta = ErrorMetadata::default();

        let invalid = outcome(
            TransactionValidity::Invalid(TransactionValidityError::Invalid(InvalidTransaction::Stale)),
            None,
        );
        let v = verdict(&invalid, &meta);
        assert!(!v.succeeded);
        assert!(v.failure_reason.unwrap().contains("stale"));

        let failed_dispatch = outcome(
            TransactionValidity::Valid(ValidTransaction::default()),
            Some(DispatchOutcome::Failed(DispatchError::Token(TokenError::BelowMinimum))),
        );
        let v = verdict(&failed_dispatch, &meta);
        assert!(!v.succeeded);
        assert!(v.failure_reason.unwrap().contains("existential deposit"));

        let ok = outcome(
            TransactionValidity::Valid(ValidTransaction::default()),
            Some(DispatchOutcome::Success),
        );
        assert!(verdict(&ok, &meta).succeeded);
    }
}
