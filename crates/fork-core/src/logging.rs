//! Injectable simulation log.
//!
//! Classified errors are collected on an explicit log object owned by
//! the simulator's caller, not on a process-global sink. Callers decide
//! what to do with the records (render them, assert on them in tests,
//! drop them). Records also go to `tracing` at a level matching their
//! severity.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::classify::{ErrorClassification, Phase, Severity};

/// One classified-error record.
#[derive(Debug, Clone)]
pub struct SimLogRecord {
    pub at: DateTime<Utc>,
    pub phase: String,
    pub chain: String,
    pub message: String,
    pub classification: String,
    pub ignored: bool,
}

/// Append-only collector of classification decisions.
#[derive(Debug, Default)]
pub struct SimulationLog {
    records: Mutex<Vec<SimLogRecord>>,
}

impl SimulationLog {
    pub fn new() -> Self {
        SimulationLog::default()
    }

    pub fn record(&self, phase: Phase, chain: &str, message: &str, decision: &ErrorClassification) {
        match decision.severity {
            Severity::Error => {
                tracing::error!(%phase, chain, classification = decision.classification, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(%phase, chain, classification = decision.classification, "{message}")
            }
            Severity::Info => {
                tracing::info!(%phase, chain, classification = decision.classification, "{message}")
            }
        }
        self.records.lock().push(SimLogRecord {
            at: Utc::now(),
            phase: phase.to_string(),
            chain: chain.to_string(),
            message: message.to_string(),
            classification: decision.classification.to_string(),
            ignored: decision.ignore,
        });
    }

    /// Take all records collected so far.
    pub fn drain(&self) -> Vec<SimLogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_error;

    #[test]
    fn test_record_and_drain() {
        let log = SimulationLog::new();
        assert!(log.is_empty());

        let decision = classify_error("request timed out", Phase::FeeEstimation, "westend");
        log.record(Phase::FeeEstimation, "westend", "request timed out", &decision);
        assert_eq!(log.len(), 1);

        let records = log.drain();
        assert_eq!(records.len(), 1);
        assert!(records[0].ignored);
        assert_eq!(records[0].phase, "fee-estimation");
        assert!(log.is_empty());
    }
}
