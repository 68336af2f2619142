//! Fee estimation wire types.
//!
//! Fees come from the runtime's `TransactionPaymentApi_query_info` call,
//! which takes the full encoded extrinsic plus its length and returns a
//! `RuntimeDispatchInfo`. Forked runtimes do not always expose this API;
//! callers classify a failed estimate instead of propagating it blindly.

use anyhow::{anyhow, Result};
use codec::{Decode, Encode};

/// Runtime API method used for fee estimation.
pub const QUERY_INFO: &str = "TransactionPaymentApi_query_info";

/// Two-dimensional runtime weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct Weight {
    #[codec(compact)]
    pub ref_time: u64,
    #[codec(compact)]
    pub proof_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum DispatchClass {
    #[codec(index = 0)]
    Normal,
    #[codec(index = 1)]
    Operational,
    #[codec(index = 2)]
    Mandatory,
}

/// Decoded `TransactionPaymentApi_query_info` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RuntimeDispatchInfo {
    pub weight: Weight,
    pub class: DispatchClass,
    pub partial_fee: u128,
}

/// SCALE arguments for `query_info`: the extrinsic bytes followed by
/// their length as a plain u32.
pub fn query_info_args(extrinsic: &[u8]) -> Vec<u8> {
    let mut args = extrinsic.to_vec();
    (extrinsic.len() as u32).encode_to(&mut args);
    args
}

/// Decode a raw `query_info` response down to the partial fee.
pub fn decode_partial_fee(raw: &[u8]) -> Result<u128> {
    RuntimeDispatchInfo::decode(&mut &raw[..])
        .map(|info| info.partial_fee)
        .map_err(|e| anyhow!("undecodable fee estimation response: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_info_args_layout() {
        let extrinsic = vec![0xAB; 10];
        let args = query_info_args(&extrinsic);
        assert_eq!(&args[..10], &extrinsic[..]);
        assert_eq!(&args[10..], &10u32.to_le_bytes());
    }

    #[test]
    fn test_decode_partial_fee() {
        let info = RuntimeDispatchInfo {
            weight: Weight {
                ref_time: 125_000,
                proof_size: 3_593,
            },
            class: DispatchClass::Normal,
            partial_fee: 158_000_000,
        };
        assert_eq!(decode_partial_fee(&info.encode()).unwrap(), 158_000_000);
        assert!(decode_partial_fee(&[0x01]).is_err());
    }
}
