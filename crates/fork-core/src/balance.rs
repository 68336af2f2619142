//! Account ledger decoding and balance-delta extraction.
//!
//! `System.Account` entries in a storage diff are located by rebuilding
//! the exact storage key for the account, then decoded as SCALE
//! `AccountInfo`. Delta extraction is best-effort display data: a value
//! that fails to decode is silently omitted, never allowed to fail the
//! simulation that produced it.

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use fork_sandbox_types::{from_planck, AccountId};

use crate::hashing::{blake2_128_concat, twox_128};
use crate::outcome::StorageDiff;

/// Balance portion of a `System.Account` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

impl AccountData {
    /// Total balance the delta comparison is defined over.
    pub fn total(&self) -> u128 {
        self.free.saturating_add(self.reserved)
    }
}

/// Full `System.Account` ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

/// Storage key of an account's `System.Account` entry:
/// twox128("System") ++ twox128("Account") ++ blake2_128_concat(account).
pub fn account_storage_key(account: &AccountId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 16 + 16 + 32);
    key.extend_from_slice(&twox_128(b"System"));
    key.extend_from_slice(&twox_128(b"Account"));
    key.extend_from_slice(&blake2_128_concat(account));
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

/// One directional value delta, in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub value: String,
    pub direction: Direction,
}

/// Compare the account's total balance before vs. after in a storage
/// diff. Emits at most one entry: `receive` when the total grew, `send`
/// when it shrank, nothing when the entry is absent, unchanged, or
/// undecodable.
pub fn compute_balance_deltas(
    account: &AccountId,
    diff: &StorageDiff,
    decimals: u8,
) -> Vec<BalanceChange> {
    let key = account_storage_key(account);
    let Some(entry) = diff.get(&key) else {
        return Vec::new();
    };

    let before = match decode_total(entry.before.as_deref()) {
        Ok(total) => total,
        Err(e) => {
            tracing::debug!("skipping balance delta, undecodable before-value: {e}");
            return Vec::new();
        }
    };
    let after = match decode_total(entry.after.as_deref()) {
        Ok(total) => total,
        Err(e) => {
            tracing::debug!("skipping balance delta, undecodable after-value: {e}");
            return Vec::new();
        }
    };

    match after.cmp(&before) {
        std::cmp::Ordering::Equal => Vec::new(),
        std::cmp::Ordering::Greater => vec![BalanceChange {
            value: from_planck(after - before, decimals),
            direction: Direction::Receive,
        }],
        std::cmp::Ordering::Less => vec![BalanceChange {
            value: from_planck(before - after, decimals),
            direction: Direction::Send,
        }],
    }
}

/// An absent entry is a zero balance; present bytes must decode fully.
fn decode_total(raw: Option<&[u8]>) -> Result<u128, codec::Error> {
    match raw {
        None => Ok(0),
        Some(mut bytes) => AccountInfo::decode(&mut bytes).map(|info| info.data.total()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: AccountId = [0x11; 32];

    fn info(free: u128, reserved: u128) -> AccountInfo {
        AccountInfo {
            nonce: 1,
            providers: 1,
            data: AccountData {
                free,
                reserved,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn diff_for(before: Option<AccountInfo>, after: Option<AccountInfo>) -> StorageDiff {
        let mut diff = StorageDiff::default();
        diff.push(
            account_storage_key(&ACCOUNT),
            before.map(|i| i.encode()),
            after.map(|i| i.encode()),
        );
        diff
    }

    #[test]
    fn test_send_delta() {
        let diff = diff_for(Some(info(5_000_000_000_000, 0)), Some(info(3_000_000_000_000, 0)));
        let deltas = compute_balance_deltas(&ACCOUNT, &diff, 12);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].direction, Direction::Send);
        assert_eq!(deltas[0].value, "2");
    }

    #[test]
    fn test_receive_delta_counts_reserved() {
        let diff = diff_for(Some(info(1_000, 500)), Some(info(1_000, 2_500)));
        let deltas = compute_balance_deltas(&ACCOUNT, &diff, 0);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].direction, Direction::Receive);
        assert_eq!(deltas[0].value, "2000");
    }

    #[test]
    fn test_absent_entry_created() {
        let diff = diff_for(None, Some(info(7, 0)));
        let deltas = compute_balance_deltas(&ACCOUNT, &diff, 0);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].direction, Direction::Receive);
        assert_eq!(deltas[0].value, "7");
    }

    #[test]
    fn test_unchanged_or_missing_emits_nothing() {
        let diff = diff_for(Some(info(9, 0)), Some(info(9, 0)));
        assert!(compute_balance_deltas(&ACCOUNT, &diff, 0).is_empty());
        assert!(compute_balance_deltas(&ACCOUNT, &StorageDiff::default(), 0).is_empty());
    }

    #[test]
    fn test_undecodable_value_is_omitted_not_fatal() {
        let mut diff = StorageDiff::default();
        diff.push(account_storage_key(&ACCOUNT), Some(vec![1, 2, 3]), Some(vec![4]));
        assert!(compute_balance_deltas(&ACCOUNT, &diff, 0).is_empty());
    }
}
