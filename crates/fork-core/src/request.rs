//! Simulation request and result value types.
//!
//! These are the serialized shapes that cross the core boundary. They
//! own no resources: results are plain values that remain meaningful
//! after the fork that produced them is gone.

use serde::{Deserialize, Serialize};

use crate::balance::BalanceChange;
use crate::fork::BuildMode;

/// Request to simulate one operation against a fresh fork.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub endpoints: Vec<String>,
    /// Hex-encoded call or full signed envelope.
    pub operation_bytes: String,
    pub sender_address: String,
    /// Hex block hash to fork at; current head when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub build_mode: BuildMode,
}

/// One item of a sequential batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub operation_bytes: String,
    pub sender_address: String,
    pub description: String,
}

/// Request to simulate an ordered batch on one shared fork.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSimulationRequest {
    pub endpoints: Vec<String>,
    pub items: Vec<BatchItem>,
    #[serde(default)]
    pub build_mode: BuildMode,
}

/// Outcome of one simulated operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success: bool,
    pub error: Option<String>,
    /// Display-unit fee string ("0" when estimation was skipped or
    /// classified as an ignorable gap).
    pub estimated_fee: String,
    pub balance_changes: Vec<BalanceChange>,
    pub events: Vec<String>,
}

/// Per-item slot of a sequential result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub index: usize,
    pub description: String,
    pub result: SimulationResult,
}

/// Ordered results of a sequential simulation. Stops appending after the
/// first blocking failure; `error` then carries an index-qualified
/// reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialSimulationResult {
    pub success: bool,
    pub error: Option<String>,
    pub results: Vec<StepResult>,
    pub total_estimated_fee: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{
            "endpoints": ["wss://westend-rpc.polkadot.io"],
            "operationBytes": "0x0500",
            "senderAddress": "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        }"#;
        let request: SimulationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.build_mode, BuildMode::Instant);
        assert!(request.block_hash.is_none());

        let json = r#"{"endpoints": [], "items": [], "buildMode": "batch"}"#;
        let batch: BatchSimulationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(batch.build_mode, BuildMode::Batch);
    }

    #[test]
    fn test_result_serializes_null_error() {
        let result = SimulationResult {
            success: true,
            error: None,
            estimated_fee: "0.0001".to_string(),
            balance_changes: Vec::new(),
            events: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["error"].is_null());
        assert_eq!(json["estimatedFee"], "0.0001");
    }
}
