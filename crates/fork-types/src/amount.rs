//! Planck/display amount conversion.
//!
//! Chain balances are integers in the smallest unit (planck); user-facing
//! amounts are decimal strings scaled by per-network decimals (10 for
//! Polkadot, 12 for Kusama/Westend). Conversion is pure integer
//! arithmetic; floats would lose precision above 2^53 planck.

use anyhow::{anyhow, bail, Result};

/// Convert a decimal display amount (e.g. "2.5") to planck units.
///
/// Rejects negative amounts and amounts with more fractional digits
/// than the network supports.
pub fn to_planck(amount: &str, decimals: u8) -> Result<u128> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        bail!("invalid amount '{}'", amount);
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    // Digits only: u128::parse would accept a leading '+'.
    if whole.is_empty() && frac.is_empty() {
        bail!("invalid amount '{}'", amount);
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid amount '{}'", amount);
    }
    if frac.len() > decimals as usize {
        bail!(
            "amount '{}' has {} fractional digits, network supports {}",
            amount,
            frac.len(),
            decimals
        );
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|e| anyhow!("invalid amount '{}': {}", amount, e))?
    };
    let scale = 10u128.pow(decimals as u32);
    let frac_planck: u128 = if frac.is_empty() {
        0
    } else {
        let parsed: u128 = frac
            .parse()
            .map_err(|e| anyhow!("invalid amount '{}': {}", amount, e))?;
        parsed * 10u128.pow((decimals as usize - frac.len()) as u32)
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_planck))
        .ok_or_else(|| anyhow!("amount '{}' overflows planck range", amount))
}

/// Render a planck amount as a decimal display string, trimming
/// trailing fractional zeros.
pub fn from_planck(planck: u128, decimals: u8) -> String {
    let scale = 10u128.pow(decimals as u32);
    let whole = planck / scale;
    let frac = planck % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}
