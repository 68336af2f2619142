//! Shared leaf types for the fork-sandbox workspace.
//!
//! This crate holds the chain-agnostic building blocks every other
//! workspace crate needs: SS58 address handling, hex payload helpers,
//! and planck/display amount conversion. It has no knowledge of forks,
//! simulation, or execution orchestration.

pub mod address;
pub mod amount;
pub mod encoding;

pub use address::{
    decode_ss58, encode_ss58, public_key, reencode_ss58, validate_address, AccountId,
};
pub use amount::{from_planck, to_planck};
pub use encoding::{parse_hex_bytes, to_hex};
