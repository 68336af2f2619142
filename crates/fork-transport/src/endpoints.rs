//! Request-endpoint validation.
//!
//! Forks speak the node's websocket RPC interface; an `https://` URL is
//! not a usable fork source. Validation happens before any fork handle
//! is created so a bad request never acquires resources.

use std::fmt;

/// Error for a request that carries no usable network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// None of the supplied endpoints is a websocket address.
    NoValidEndpoints { supplied: Vec<String> },
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::NoValidEndpoints { supplied } => {
                write!(
                    f,
                    "NoValidEndpoints: none of [{}] is a ws:// or wss:// address",
                    supplied.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for EndpointError {}

/// Check whether a URL is a websocket-style node endpoint.
pub fn is_websocket_endpoint(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    lower.starts_with("ws://") || lower.starts_with("wss://")
}

/// Filter a request's endpoint list down to usable websocket addresses,
/// preserving order. Fails fast when nothing usable remains.
pub fn select_endpoints(endpoints: &[String]) -> Result<Vec<String>, EndpointError> {
    let usable: Vec<String> = endpoints
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| is_websocket_endpoint(e))
        .collect();
    if usable.is_empty() {
        return Err(EndpointError::NoValidEndpoints {
            supplied: endpoints.to_vec(),
        });
    }
    Ok(usable)
}
