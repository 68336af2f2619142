//! Call-constructor registry.
//!
//! Reconstructing a dispatchable call from `(section, method)` plus a
//! parameter map is an explicit registry lookup, not a dynamic property
//! access: every supported call is registered up front, and an unknown
//! pair fails with the list of known calls rather than a silent miss.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use codec::{Compact, Encode};
use serde_json::Value;

use fork_sandbox_types::{public_key, to_planck};

use crate::fork::ChainInfo;

/// Builds the SCALE call bytes for one `(section, method)` pair.
pub type CallConstructor = fn(&Value, &ChainInfo) -> Result<Vec<u8>>;

pub struct CallRegistry {
    constructors: HashMap<(&'static str, &'static str), CallConstructor>,
}

impl CallRegistry {
    /// Registry covering the calls the planner is allowed to emit.
    pub fn standard() -> Self {
        let mut constructors: HashMap<(&'static str, &'static str), CallConstructor> =
            HashMap::new();
        constructors.insert(("balances", "transfer_allow_death"), transfer_allow_death);
        constructors.insert(("balances", "transfer_keep_alive"), transfer_keep_alive);
        constructors.insert(("system", "remark"), remark);
        CallRegistry { constructors }
    }

    pub fn construct(
        &self,
        section: &str,
        method: &str,
        params: &Value,
        info: &ChainInfo,
    ) -> Result<Vec<u8>> {
        match self.constructors.get(&(section, method)) {
            Some(build) => build(params, info)
                .with_context(|| format!("constructing call {}.{}", section, method)),
            None => bail!(
                "unknown call {}.{} (known: {})",
                section,
                method,
                self.known().join(", ")
            ),
        }
    }

    pub fn known(&self) -> Vec<String> {
        let mut known: Vec<String> = self
            .constructors
            .keys()
            .map(|(s, m)| format!("{}.{}", s, m))
            .collect();
        known.sort();
        known
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        CallRegistry::standard()
    }
}

const SYSTEM_PALLET: u8 = 0;
const REMARK_CALL: u8 = 0;
const BALANCES_PALLET: u8 = 5;
const TRANSFER_ALLOW_DEATH: u8 = 0;
const TRANSFER_KEEP_ALIVE: u8 = 3;

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string parameter '{}'", key))
}

fn encode_transfer(params: &Value, info: &ChainInfo, call_index: u8) -> Result<Vec<u8>> {
    let dest = public_key(str_param(params, "dest")?)?;
    let value = to_planck(str_param(params, "amount")?, info.decimals)?;

    let mut call = vec![BALANCES_PALLET, call_index, 0]; // MultiAddress::Id
    call.extend_from_slice(&dest);
    Compact(value).encode_to(&mut call);
    Ok(call)
}

fn transfer_allow_death(params: &Value, info: &ChainInfo) -> Result<Vec<u8>> {
    encode_transfer(params, info, TRANSFER_ALLOW_DEATH)
}

fn transfer_keep_alive(params: &Value, info: &ChainInfo) -> Result<Vec<u8>> {
    encode_transfer(params, info, TRANSFER_KEEP_ALIVE)
}

fn remark(params: &Value, _info: &ChainInfo) -> Result<Vec<u8>> {
    let text = str_param(params, "remark")?;
    let mut call = vec![SYSTEM_PALLET, REMARK_CALL];
    text.as_bytes().to_vec().encode_to(&mut call);
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn info() -> ChainInfo {
        ChainInfo {
            chain_name: "westend".to_string(),
            ss58_format: 42,
            decimals: 12,
            spec_version: 1,
            tx_version: 1,
            genesis_hash: [0; 32],
        }
    }

    #[test]
    fn test_transfer_layout() {
        let registry = CallRegistry::standard();
        let call = registry
            .construct(
                "balances",
                "transfer_allow_death",
                &json!({"dest": ALICE, "amount": "1"}),
                &info(),
            )
            .unwrap();
        assert_eq!(call[0], BALANCES_PALLET);
        assert_eq!(call[1], TRANSFER_ALLOW_DEATH);
        assert_eq!(call[2], 0);
        assert_eq!(&call[3..35], &public_key(ALICE).unwrap());
    }

    #[test]
    fn test_unknown_call_lists_known() {
        let registry = CallRegistry::standard();
        let err = registry
            .construct("staking", "bond", &json!({}), &info())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("staking.bond"));
        assert!(msg.contains("balances.transfer_allow_death"));
    }

    #[test]
    fn test_missing_parameter_is_contextual() {
        let registry = CallRegistry::standard();
        let err = registry
            .construct("system", "remark", &json!({}), &info())
            .unwrap_err();
        assert!(format!("{err:#}").contains("remark"));
    }
}
