//! CBOR encoding for persisted states and wire messages.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::SyncMessage;
use crate::state::CanvasState;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encodes a state for the local store.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_state(state: &CanvasState) -> ProtocolResult<Vec<u8>> {
    to_cbor(state)
}

/// Decodes a state read from the local store.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] for truncated or foreign bytes.
pub fn decode_state(bytes: &[u8]) -> ProtocolResult<CanvasState> {
    from_cbor(bytes)
}

/// Encodes a protocol message.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_message(message: &SyncMessage) -> ProtocolResult<Vec<u8>> {
    to_cbor(message)
}

/// Decodes a protocol message.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] for malformed bytes.
pub fn decode_message(bytes: &[u8]) -> ProtocolResult<SyncMessage> {
    from_cbor(bytes)
}
