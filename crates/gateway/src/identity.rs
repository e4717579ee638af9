//! Connection identity generation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use proto::{ConnectionId, GatewayError};
use rand::RngCore;
use rand::rngs::OsRng;

/// Random bytes behind each connection identity.
pub const CONNECTION_ID_BYTES: usize = 12;

/// Generates a fresh connection identity from the OS random source.
///
/// A failure here is fatal for the connection attempt only.
pub fn generate_connection_id() -> Result<ConnectionId, GatewayError> {
    let mut raw = [0u8; CONNECTION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| GatewayError::Identity(e.to_string()))?;
    Ok(ConnectionId::from(STANDARD.encode(raw)))
}
