//! SS58 address utilities.
//!
//! This module is the canonical source for address handling in the workspace.
//! Other crates should import from here rather than defining their own logic.
//!
//! The same 32-byte public key renders differently per network: Polkadot
//! uses format 0 ("1..."), Kusama format 2, generic Substrate format 42
//! ("5..."). Address format mismatches are a common silent-failure source
//! in fee estimation, so normalization is explicit: [`reencode_ss58`]
//! re-renders any valid address in a target format.

use anyhow::{anyhow, bail, Result};
use blake2::{Blake2b512, Digest};

/// A raw 32-byte account public key.
pub type AccountId = [u8; 32];

/// Prefix mixed into the SS58 checksum preimage.
const SS58_PREFIX: &[u8] = b"SS58PRE";

/// Checksum length for 32-byte account payloads.
const CHECKSUM_LEN: usize = 2;

/// Decode an SS58 address into its format and 32-byte public key.
///
/// Verifies the blake2b-512 checksum; a well-formed but corrupted
/// address is rejected, not silently accepted.
pub fn decode_ss58(addr: &str) -> Result<(u16, AccountId)> {
    let raw = bs58::decode(addr.trim())
        .into_vec()
        .map_err(|e| anyhow!("invalid base58 in address '{}': {}", addr, e))?;

    if raw.len() < 1 + 32 + CHECKSUM_LEN {
        bail!("address '{}' too short ({} bytes decoded)", addr, raw.len());
    }

    let (format, prefix_len) = match raw[0] {
        0..=63 => (raw[0] as u16, 1),
        64..=127 => {
            if raw.len() < 2 + 32 + CHECKSUM_LEN {
                bail!("address '{}' too short for two-byte format prefix", addr);
            }
            let lower = ((raw[0] & 0b0011_1111) as u16) << 2 | (raw[1] as u16) >> 6;
            let upper = ((raw[1] & 0b0011_1111) as u16) << 8;
            (lower | upper, 2)
        }
        _ => bail!("address '{}' has a reserved format byte {}", addr, raw[0]),
    };

    let body_end = prefix_len + 32;
    if raw.len() != body_end + CHECKSUM_LEN {
        bail!(
            "address '{}' has unexpected payload length {} (expected 32-byte account)",
            addr,
            raw.len() - prefix_len - CHECKSUM_LEN
        );
    }

    let checksum = ss58_checksum(&raw[..body_end]);
    if raw[body_end..] != checksum[..CHECKSUM_LEN] {
        bail!("address '{}' failed checksum verification", addr);
    }

    let mut public = [0u8; 32];
    public.copy_from_slice(&raw[prefix_len..body_end]);
    Ok((format, public))
}

/// Encode a 32-byte public key as an SS58 address in the given format.
pub fn encode_ss58(public: &AccountId, format: u16) -> String {
    let mut raw = Vec::with_capacity(2 + 32 + CHECKSUM_LEN);
    if format < 64 {
        raw.push(format as u8);
    } else {
        // Two-byte prefix for formats 64..=16383.
        raw.push(((format & 0b0000_0000_1111_1100) >> 2) as u8 | 0b0100_0000);
        raw.push((format >> 8) as u8 | ((format & 0b11) << 6) as u8);
    }
    raw.extend_from_slice(public);
    let checksum = ss58_checksum(&raw);
    raw.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(raw).into_string()
}

/// Re-encode an address in a target SS58 format.
///
/// This is the normalization step fee estimation requires: the fork's
/// runtime expects addresses in its own format, and a mismatched format
/// fails silently rather than loudly.
pub fn reencode_ss58(addr: &str, format: u16) -> Result<String> {
    let (_, public) = decode_ss58(addr)?;
    Ok(encode_ss58(&public, format))
}

/// Extract the raw public key from an SS58 address.
pub fn public_key(addr: &str) -> Result<AccountId> {
    decode_ss58(addr).map(|(_, public)| public)
}

/// Check whether a string is a valid SS58 address, optionally requiring
/// a specific network format.
pub fn validate_address(addr: &str, expected_format: Option<u16>) -> bool {
    match decode_ss58(addr) {
        Ok((format, _)) => expected_format.map_or(true, |expected| format == expected),
        Err(_) => false,
    }
}

fn ss58_checksum(data: &[u8]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_PREFIX);
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known dev account (Alice) in generic Substrate format 42.
    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn test_decode_known_address() {
        let (format, public) = decode_ss58(ALICE).unwrap();
        assert_eq!(format, 42);
        assert_eq!(public.len(), 32);
    }

    #[test]
    fn test_roundtrip_same_format() {
        let (format, public) = decode_ss58(ALICE).unwrap();
        assert_eq!(encode_ss58(&public, format), ALICE);
    }

    #[test]
    fn test_reencode_changes_rendering_not_key() {
        let polkadot_form = reencode_ss58(ALICE, 0).unwrap();
        assert_ne!(polkadot_form, ALICE);
        let (format, public) = decode_ss58(&polkadot_form).unwrap();
        assert_eq!(format, 0);
        assert_eq!(public, public_key(ALICE).unwrap());
    }

    #[test]
    fn test_two_byte_format_roundtrip() {
        let public = public_key(ALICE).unwrap();
        let encoded = encode_ss58(&public, 255);
        let (format, decoded) = decode_ss58(&encoded).unwrap();
        assert_eq!(format, 255);
        assert_eq!(decoded, public);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let mut corrupted = ALICE.to_string();
        // Swap the last character for a different base58 digit.
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == '1' { '2' } else { '1' });
        assert!(decode_ss58(&corrupted).is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(ALICE, None));
        assert!(validate_address(ALICE, Some(42)));
        assert!(!validate_address(ALICE, Some(0)));
        assert!(!validate_address("not-an-address", None));
        assert!(!validate_address("", None));
    }
}
