//! Endpoint validation and known-network registry.
//!
//! The transport layer itself (websocket sessions, reconnection, RPC
//! framing) is an external collaborator; this crate owns only the parts
//! the simulator contracts on: deciding whether a request carries any
//! usable network address, and mapping endpoints to known network
//! identities (SS58 format, decimals, token symbol).

pub mod endpoints;
pub mod network;

pub use endpoints::{is_websocket_endpoint, select_endpoints, EndpointError};
pub use network::{infer_network_from_url, network_by_name, network_by_symbol, NetworkInfo, NETWORKS};
