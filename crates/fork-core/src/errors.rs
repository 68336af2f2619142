//! Simulator error taxonomy.
//!
//! Classified operation failures travel inside result values; the
//! variants here are the outer failures: rejected input (no resources
//! acquired), unrecoverable infrastructure faults, and internal
//! simulator defects that must never be mistaken for a failing
//! operation.

use std::fmt;

use fork_transport::EndpointError;

#[derive(Debug)]
pub enum SimulatorError {
    /// No usable websocket endpoint in the request.
    NoValidEndpoints { supplied: Vec<String> },
    /// Sequential request with zero items.
    EmptyBatch,
    /// Malformed request field (bad hex, bad address, bad block hash).
    InvalidRequest(String),
    /// Could not reach or operate the fork at all.
    Infrastructure(anyhow::Error),
    /// A sealed block dropped operations it should have included. This
    /// is a simulator defect, not an operation failure.
    BlockMissedOperations { expected: u32, included: u32 },
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::NoValidEndpoints { supplied } => {
                write!(
                    f,
                    "no valid endpoints: none of [{}] is a websocket address",
                    supplied.join(", ")
                )
            }
            SimulatorError::EmptyBatch => write!(f, "sequential simulation requires at least one item"),
            SimulatorError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            SimulatorError::Infrastructure(e) => write!(f, "simulation infrastructure failure: {:#}", e),
            SimulatorError::BlockMissedOperations { expected, included } => write!(
                f,
                "internal simulator defect: sealed block included {} of {} expected operations",
                included, expected
            ),
        }
    }
}

impl std::error::Error for SimulatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulatorError::Infrastructure(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<EndpointError> for SimulatorError {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::NoValidEndpoints { supplied } => {
                SimulatorError::NoValidEndpoints { supplied }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_detail() {
        let e = SimulatorError::NoValidEndpoints {
            supplied: vec!["https://x".to_string()],
        };
        assert!(e.to_string().contains("https://x"));

        let e = SimulatorError::BlockMissedOperations {
            expected: 1,
            included: 0,
        };
        assert!(e.to_string().contains("defect"));
        assert!(e.to_string().contains("0 of 1"));
    }
}
