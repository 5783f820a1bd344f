//! Protocol handshake helpers.

use crate::message::Response;
use crate::Error;

/// What a host reported about itself in its `hello` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    /// Build id of the engine the host wraps.
    pub build_id: u32,
    /// Protocol version the host speaks.
    pub protocol_version: u32,
}

/// Check if a protocol version is compatible with the current version.
pub fn is_version_compatible(client_version: u32, host_version: u32) -> bool {
    // Exact match until a second protocol version exists.
    client_version == host_version
}

/// Negotiate the protocol version between dbmig and a host.
pub fn negotiate_version(client_version: u32, host_version: u32) -> Option<u32> {
    if is_version_compatible(client_version, host_version) {
        Some(host_version)
    } else {
        None
    }
}

/// Validate a host's answer to `hello`.
pub fn accept_hello(response: Response) -> Result<HostInfo, Error> {
    let response = response.into_result().map_err(Error::InvalidMessage)?;
    let protocol_version = response.protocol_version.unwrap_or(1);
    if negotiate_version(crate::PROTOCOL_VERSION, protocol_version).is_none() {
        return Err(Error::VersionMismatch {
            expected: crate::PROTOCOL_VERSION,
            actual: protocol_version,
        });
    }
    let build_id = response
        .build_id
        .ok_or_else(|| Error::InvalidMessage("hello response without build_id".to_string()))?;
    Ok(HostInfo {
        build_id,
        protocol_version,
    })
}
