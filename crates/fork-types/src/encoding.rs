//! Hex payload helpers.
//!
//! Operation payloads cross the core boundary as hex strings; these
//! helpers centralize the 0x-tolerant decode and the context-aware
//! error messages so call sites stay uniform.

use anyhow::{anyhow, Result};

/// Parse a hex string to raw bytes.
///
/// # Arguments
/// * `hex_str` - Hex string (with or without 0x prefix)
/// * `context` - Description for error messages (e.g., "operation bytes")
pub fn parse_hex_bytes(hex_str: &str, context: &str) -> Result<Vec<u8>> {
    let trimmed = hex_str.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(stripped).map_err(|e| anyhow!("Invalid {} hex '{}': {}", context, hex_str, e))
}

/// Encode bytes as a 0x-prefixed lowercase hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("0x0102", "payload").unwrap(), vec![1, 2]);
        assert_eq!(parse_hex_bytes("0102", "payload").unwrap(), vec![1, 2]);
        assert_eq!(parse_hex_bytes(" 0X0a ", "payload").unwrap(), vec![10]);
        assert!(parse_hex_bytes("0xzz", "payload").is_err());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[1, 2, 255]), "0x0102ff");
        assert_eq!(to_hex(&[]), "0x");
    }
}
