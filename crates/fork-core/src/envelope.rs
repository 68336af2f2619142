//! Extrinsic envelope encode/decode.
//!
//! Operations arrive either as bare call bytes or as a fully-formed v4
//! signed envelope. Fee estimation and sequential block-building need the
//! inner call plus a signer, so [`extract_call`] peels the envelope, and
//! [`mock_signed_envelope`] rebuilds one bound to the fork's current
//! nonce. The fork has no real signing keys; synthetic signatures only
//! have to satisfy format checks, never cryptographic verification.

use anyhow::{anyhow, bail, Result};
use codec::{Compact, Decode, Encode};
use fork_sandbox_types::AccountId;

use crate::hashing::blake2_256;

const SIGNED_BIT: u8 = 0b1000_0000;
const VERSION_MASK: u8 = 0b0111_1111;
const EXTRINSIC_VERSION: u8 = 4;

/// MultiAddress variant for a raw 32-byte account id.
const ADDRESS_ID: u8 = 0;
/// MultiSignature variant for sr25519 (64 bytes).
const SIGNATURE_SR25519: u8 = 1;

/// An operation peeled out of its envelope (or taken bare).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOperation {
    pub call: Vec<u8>,
    pub signer: Option<AccountId>,
    pub nonce: Option<u32>,
    pub tip: u128,
}

/// Decode a length-prefixed v4 extrinsic and extract the inner call.
///
/// Signed envelopes must use `MultiAddress::Id`; index/raw address forms
/// are not dispatchable without on-chain lookup and are rejected.
pub fn extract_call(extrinsic: &[u8]) -> Result<DecodedOperation> {
    let mut input = extrinsic;
    let declared = Compact::<u32>::decode(&mut input)
        .map_err(|e| anyhow!("invalid extrinsic length prefix: {}", e))?
        .0 as usize;
    if input.len() != declared {
        bail!(
            "extrinsic length prefix {} does not match body length {}",
            declared,
            input.len()
        );
    }

    let version = u8::decode(&mut input)?;
    if version & VERSION_MASK != EXTRINSIC_VERSION {
        bail!("unsupported extrinsic version {}", version & VERSION_MASK);
    }
    if version & SIGNED_BIT == 0 {
        return Ok(DecodedOperation {
            call: input.to_vec(),
            signer: None,
            nonce: None,
            tip: 0,
        });
    }

    let signer = decode_address(&mut input)?;
    skip_signature(&mut input)?;
    skip_era(&mut input)?;
    let nonce = Compact::<u32>::decode(&mut input)?.0;
    let tip = Compact::<u128>::decode(&mut input)?.0;

    if input.is_empty() {
        bail!("signed extrinsic carries no call");
    }
    Ok(DecodedOperation {
        call: input.to_vec(),
        signer: Some(signer),
        nonce: Some(nonce),
        tip,
    })
}

/// Wrap a call in a signed v4 envelope with a synthetic signature.
///
/// `binding` ties the signature bytes to the fork state it was produced
/// for (head hash or genesis hash), so re-simulating at a different head
/// yields a different envelope.
pub fn mock_signed_envelope(
    call: &[u8],
    signer: &AccountId,
    nonce: u32,
    tip: u128,
    binding: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(call.len() + 140);
    body.push(SIGNED_BIT | EXTRINSIC_VERSION);
    body.push(ADDRESS_ID);
    body.extend_from_slice(signer);
    body.push(SIGNATURE_SR25519);
    body.extend_from_slice(&synthetic_signature(call, signer, nonce, binding));
    body.push(0); // immortal era
    Compact(nonce).encode_to(&mut body);
    Compact(tip).encode_to(&mut body);
    body.extend_from_slice(call);

    let mut out = Vec::with_capacity(body.len() + 4);
    Compact(body.len() as u32).encode_to(&mut out);
    out.extend_from_slice(&body);
    out
}

/// Deterministic 64-byte signature stand-in: two blake2-256 digests over
/// domain-separated preimages of the signing context.
fn synthetic_signature(call: &[u8], signer: &AccountId, nonce: u32, binding: &[u8]) -> [u8; 64] {
    let mut preimage = Vec::with_capacity(call.len() + binding.len() + 40);
    preimage.extend_from_slice(signer);
    preimage.extend_from_slice(&nonce.to_le_bytes());
    preimage.extend_from_slice(binding);
    preimage.extend_from_slice(call);

    let mut sig = [0u8; 64];
    preimage.push(0);
    sig[..32].copy_from_slice(&blake2_256(&preimage));
    *preimage.last_mut().unwrap() = 1;
    sig[32..].copy_from_slice(&blake2_256(&preimage));
    sig
}

fn decode_address(input: &mut &[u8]) -> Result<AccountId> {
    let variant = u8::decode(input)?;
    if variant != ADDRESS_ID {
        bail!("unsupported address variant {} (expected raw account id)", variant);
    }
    Ok(<[u8; 32]>::decode(input)?)
}

fn skip_signature(input: &mut &[u8]) -> Result<()> {
    let variant = u8::decode(input)?;
    let len = match variant {
        0 | 1 => 64, // ed25519 / sr25519
        2 => 65,     // ecdsa
        other => bail!("unsupported signature variant {}", other),
    };
    if input.len() < len {
        bail!("extrinsic truncated inside signature");
    }
    *input = &input[len..];
    Ok(())
}

fn skip_era(input: &mut &[u8]) -> Result<()> {
    let first = u8::decode(input)?;
    if first != 0 {
        // Mortal era encodes as two bytes.
        let _ = u8::decode(input)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNER: AccountId = [0xAA; 32];
    const CALL: &[u8] = &[5, 0, 0, 1, 2, 3];

    #[test]
    fn test_signed_envelope_roundtrip() {
        let envelope = mock_signed_envelope(CALL, &SIGNER, 7, 25, b"binding");
        let decoded = extract_call(&envelope).unwrap();
        assert_eq!(decoded.call, CALL);
        assert_eq!(decoded.signer, Some(SIGNER));
        assert_eq!(decoded.nonce, Some(7));
        assert_eq!(decoded.tip, 25);
    }

    #[test]
    fn test_unsigned_envelope_extracts_bare_call() {
        let mut body = vec![EXTRINSIC_VERSION];
        body.extend_from_slice(CALL);
        let mut envelope = Vec::new();
        Compact(body.len() as u32).encode_to(&mut envelope);
        envelope.extend_from_slice(&body);

        let decoded = extract_call(&envelope).unwrap();
        assert_eq!(decoded.call, CALL);
        assert_eq!(decoded.signer, None);
        assert_eq!(decoded.nonce, None);
    }

    #[test]
    fn test_envelope_is_deterministic_per_binding() {
        let a = mock_signed_envelope(CALL, &SIGNER, 0, 0, b"head-1");
        let b = mock_signed_envelope(CALL, &SIGNER, 0, 0, b"head-1");
        let c = mock_signed_envelope(CALL, &SIGNER, 0, 0, b"head-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_length_prefix_must_match() {
        let mut envelope = mock_signed_envelope(CALL, &SIGNER, 0, 0, b"x");
        envelope.pop();
        assert!(extract_call(&envelope).is_err());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        // Unsigned v3 envelope.
        let mut body = vec![3u8];
        body.extend_from_slice(CALL);
        let mut out = Vec::new();
        Compact(body.len() as u32).encode_to(&mut out);
        out.extend_from_slice(&body);
        assert!(extract_call(&out).is_err());
    }
}
