//! Capture-server list parsing
//!
//! The `ipc.server` key arrives as one comma-separated string. Order is
//! semantically significant: it determines round-robin assignment order.

use tracing::info;

use crate::errors::ConfigError;

/// Split a raw server-list string into trimmed, non-empty identifiers.
///
/// Pure transformation; no I/O. Fails with [`ConfigError::EmptyServerList`]
/// when nothing usable remains after trimming.
pub fn parse_server_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let servers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect();

    if servers.is_empty() {
        return Err(ConfigError::EmptyServerList);
    }

    info!(count = servers.len(), "connecting capture servers");
    Ok(servers)
}
