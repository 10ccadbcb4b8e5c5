//! Fuzz testing harnesses for CanvasSync.
//!
//! These targets take arbitrary bytes and must never panic. They can be
//! driven by cargo-fuzz or by proptest.

use canvas_sync_protocol::{
    decode_message, decode_state, encode_message, encode_state, CanvasState, Graph, Transaction,
};
use canvas_sync_server::{CanvasServer, ServerConfig};
use serde_json::Value;

use crate::fixtures::at;

/// Fuzz target for state decoding.
///
/// Tests that arbitrary byte sequences either:
/// - Decode to a state that re-encodes and decodes to itself, or
/// - Return a proper error (no panics)
pub fn fuzz_state_decode(data: &[u8]) {
    if let Ok(state) = decode_state(data) {
        let encoded = encode_state(&state).expect("Decoded state must re-encode");
        let decoded = decode_state(&encoded).expect("Re-encoded state must decode");
        assert_eq!(state, decoded, "State roundtrip mismatch");
    }
}

/// Fuzz target for message decoding.
pub fn fuzz_message_decode(data: &[u8]) {
    if let Ok(message) = decode_message(data) {
        let encoded = encode_message(&message).expect("Decoded message must re-encode");
        let decoded = decode_message(&encoded).expect("Re-encoded message must decode");
        assert_eq!(message.type_code(), decoded.type_code());
    }
}

/// Fuzz target for the server's byte entry point.
///
/// Any input must produce either an encoded response or an error.
pub fn fuzz_server_request(data: &[u8]) {
    let server = CanvasServer::new(ServerConfig::default());
    if let Ok(response) = server.handle_bytes(data) {
        decode_message(&response).expect("Server responses must decode");
    }
}

/// Fuzz target for replay of malformed payloads.
///
/// Interprets the input as a JSON payload. Whatever it holds, replay must
/// account for the transaction as applied or skipped.
pub fn fuzz_payload_replay(data: &[u8]) {
    let payload = serde_json::from_slice::<Value>(data)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(data).into_owned()));
    let mut state = CanvasState::new("fuzz", Graph::default(), at(0));
    state
        .transactions
        .push(Transaction::new("fuzz".into(), at(1), payload));

    let replay = state.replay();
    assert_eq!(replay.applied + replay.skipped.len(), 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_node, state_with, tx_at};
    use proptest::prelude::*;

    #[test]
    fn empty_input() {
        fuzz_state_decode(&[]);
        fuzz_message_decode(&[]);
        fuzz_server_request(&[]);
        fuzz_payload_replay(&[]);
    }

    #[test]
    fn valid_state_input() {
        let state = state_with("v1", vec![tx_at("a", 1, add_node("a"))]);
        fuzz_state_decode(&encode_state(&state).unwrap());
    }

    #[test]
    fn truncated_state_input() {
        let state = state_with("v1", vec![tx_at("a", 1, add_node("a"))]);
        let encoded = encode_state(&state).unwrap();
        for len in 0..encoded.len() {
            fuzz_state_decode(&encoded[..len]);
        }
    }

    #[test]
    fn malformed_payloads() {
        fuzz_payload_replay(b"null");
        fuzz_payload_replay(b"[1, 2, 3]");
        fuzz_payload_replay(br#"{"nodes": {"added": "nope"}}"#);
        fuzz_payload_replay(br#"{"nodes": {"removed": ["ghost"]}}"#);
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_state_decode(&data);
            fuzz_message_decode(&data);
            fuzz_server_request(&data);
            fuzz_payload_replay(&data);
        }
    }
}
