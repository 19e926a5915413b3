//! Endpoint parsing.

use crate::error::TransportError;

/// Normalize a validator endpoint to a `host:port` socket address string.
///
/// Accepts `tcp://host:port` or bare `host:port`.
pub fn parse_endpoint(endpoint: &str) -> Result<String, TransportError> {
    let trimmed = endpoint.trim();
    let address = match trimmed.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(TransportError::InvalidEndpoint(endpoint.to_string())),
        None => trimmed,
    };

    let valid = match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(address.to_string())
}
