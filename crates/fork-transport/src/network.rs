//! Known-network registry.
//!
//! Maps the networks the simulator understands to their address format,
//! token decimals and default public endpoint. Unknown endpoints are
//! still forkable; the registry only feeds address re-encoding and
//! display-amount conversion defaults.

use serde::Serialize;

/// Static identity of a known network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub name: &'static str,
    /// SS58 address format prefix.
    pub ss58_format: u16,
    /// Token decimals (planck scale).
    pub decimals: u8,
    pub symbol: &'static str,
    pub default_endpoint: &'static str,
}

/// Networks the simulator ships identities for.
pub const NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "polkadot",
        ss58_format: 0,
        decimals: 10,
        symbol: "DOT",
        default_endpoint: "wss://rpc.polkadot.io",
    },
    NetworkInfo {
        name: "kusama",
        ss58_format: 2,
        decimals: 12,
        symbol: "KSM",
        default_endpoint: "wss://kusama-rpc.polkadot.io",
    },
    NetworkInfo {
        name: "westend",
        ss58_format: 42,
        decimals: 12,
        symbol: "WND",
        default_endpoint: "wss://westend-rpc.polkadot.io",
    },
];

/// Look up a network by its lowercase name.
pub fn network_by_name(name: &str) -> Option<&'static NetworkInfo> {
    let name = name.trim().to_lowercase();
    NETWORKS.iter().find(|n| n.name == name)
}

/// Look up a network by token symbol (case-insensitive).
pub fn network_by_symbol(symbol: &str) -> Option<&'static NetworkInfo> {
    let symbol = symbol.trim().to_uppercase();
    NETWORKS.iter().find(|n| n.symbol == symbol)
}

/// Guess a network identity from an endpoint URL.
///
/// Matches on the network name appearing in the host portion, so both
/// official and third-party endpoints resolve (`wss://kusama.api.onfinality.io`
/// maps to kusama). Returns None for unrecognized hosts.
pub fn infer_network_from_url(url: &str) -> Option<&'static NetworkInfo> {
    let lower = url.trim().to_lowercase();
    let host = lower
        .split("://")
        .nth(1)
        .unwrap_or(&lower)
        .split('/')
        .next()
        .unwrap_or("");
    // rpc.polkadot.io carries no "westend"/"kusama" marker, so check the
    // more specific names first.
    for name in ["westend", "kusama", "polkadot"] {
        if host.contains(name) {
            return network_by_name(name);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_by_name() {
        let polkadot = network_by_name("polkadot").unwrap();
        assert_eq!(polkadot.ss58_format, 0);
        assert_eq!(polkadot.decimals, 10);
        assert_eq!(polkadot.symbol, "DOT");

        let kusama = network_by_name(" Kusama ").unwrap();
        assert_eq!(kusama.ss58_format, 2);
        assert_eq!(kusama.decimals, 12);

        assert!(network_by_name("acala").is_none());
    }

    #[test]
    fn test_network_by_symbol() {
        assert_eq!(network_by_symbol("wnd").unwrap().name, "westend");
        assert!(network_by_symbol("ETH").is_none());
    }

    #[test]
    fn test_infer_network_from_url() {
        assert_eq!(
            infer_network_from_url("wss://rpc.polkadot.io").unwrap().name,
            "polkadot"
        );
        assert_eq!(
            infer_network_from_url("wss://kusama-rpc.polkadot.io")
                .unwrap()
                .name,
            "kusama"
        );
        assert_eq!(
            infer_network_from_url("wss://westend.api.onfinality.io/public-ws")
                .unwrap()
                .name,
            "westend"
        );
        assert!(infer_network_from_url("wss://rpc.astar.network").is_none());
    }
}
