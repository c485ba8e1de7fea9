//! Wire codec: encodes/decodes the eight ZOCP verbs as single-key JSON
//! objects, UTF-8 text, carried as a whisper or shout.
//!
//! The eight payload shapes are heterogeneous enough (GET's is
//! `null | [string]`, SUB's is a fixed 4-tuple, SIG's is a 2-tuple)
//! that a derived externally-tagged enum would need wrapper structs
//! uglier than a hand-rolled match over `serde_json::Value`, so we
//! keep `serde_json` at the edges only, matching how the teacher kept
//! `serde_json` for frame payloads while hand-rolling the frame shape
//! itself.

use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::{Result, ZocpError};

/// The eight canonical ZOCP verbs, decoded from or ready to encode to
/// a single-key JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    /// `null` ⇒ whole capability; `Some(names)` ⇒ named slots only.
    Get(Option<Vec<String>>),
    /// Partial-capability mapping, deep-merged into the local tree.
    Set(Value),
    /// `[method, [args...]]`. Reserved; accepted and dropped.
    Call(Value),
    /// `[emit_peer_hex, emitter, recv_peer_hex, receiver]`.
    Sub(SubPayload),
    /// Same shape as `Sub`.
    Unsub(SubPayload),
    /// Reserved; accepted and dropped.
    Rep(Value),
    /// Partial-capability mapping.
    Mod(Value),
    /// `[emitter, value]`.
    Sig(String, Value),
}

/// The shared 4-tuple payload of SUB/UNSUB.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPayload {
    pub emit_peer: String,
    pub emitter: Option<String>,
    pub recv_peer: String,
    pub receiver: Option<String>,
}

impl Verb {
    /// Decode a verb from a JSON text frame. The frame must be a
    /// single-key object; any other shape or an unrecognized key is a
    /// decode error — callers distinguish "unrecognized key" from
    /// "malformed JSON" via `Verb::decode_key` when they need the
    /// `handle_<verb>` extension point (spec §4.3/§9).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let (key, payload) = Self::single_key(value)?;
        Self::from_key_payload(&key, payload).ok_or_else(|| ZocpError::UnknownVerb(key))
    }

    /// Decode only as far as the single verb key and its raw payload,
    /// leaving unknown-verb dispatch to the caller (the protocol
    /// engine's `handle_<verb>` extension map).
    pub fn decode_key(bytes: &[u8]) -> Result<(String, Value)> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::single_key(value)
    }

    fn single_key(value: Value) -> Result<(String, Value)> {
        let mut map = match value {
            Value::Object(m) => m,
            other => return Err(ZocpError::decode(format!("frame is not an object: {other}"))),
        };
        if map.len() != 1 {
            return Err(ZocpError::decode(format!(
                "frame must have exactly one verb key, got {}",
                map.len()
            )));
        }
        let key = map.keys().next().unwrap().clone();
        let payload = map.remove(&key).unwrap();
        Ok((key, payload))
    }

    fn from_key_payload(key: &str, payload: Value) -> Option<Self> {
        Some(match key {
            "GET" => Verb::Get(match payload {
                Value::Null => None,
                Value::Array(names) => Some(
                    names
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            }),
            "SET" => Verb::Set(payload),
            "CALL" => Verb::Call(payload),
            "SUB" => Verb::Sub(decode_sub_payload(payload)?),
            "UNSUB" => Verb::Unsub(decode_sub_payload(payload)?),
            "REP" => Verb::Rep(payload),
            "MOD" => Verb::Mod(payload),
            "SIG" => {
                let arr = payload.as_array()?;
                if arr.len() != 2 {
                    return None;
                }
                let emitter = arr[0].as_str()?.to_string();
                Verb::Sig(emitter, arr[1].clone())
            }
            _ => return None,
        })
    }

    /// Encode this verb as a single-key JSON object, UTF-8 text.
    ///
    /// Returns `Bytes` rather than `Vec<u8>` because every outbound
    /// frame is fanned out to potentially many subscriber peers
    /// (spec §4.5's SIG/MOD fan-out): `Bytes::clone` is a refcount
    /// bump, not a buffer copy, matching the teacher's `Message`
    /// frames (`monocoque-core/src/message.rs`).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let value = match self {
            Verb::Get(None) => json!({ "GET": Value::Null }),
            Verb::Get(Some(names)) => json!({ "GET": names }),
            Verb::Set(data) => json!({ "SET": data }),
            Verb::Call(data) => json!({ "CALL": data }),
            Verb::Sub(p) => json!({ "SUB": encode_sub_payload(p) }),
            Verb::Unsub(p) => json!({ "UNSUB": encode_sub_payload(p) }),
            Verb::Rep(data) => json!({ "REP": data }),
            Verb::Mod(data) => json!({ "MOD": data }),
            Verb::Sig(name, value) => json!({ "SIG": [name, value] }),
        };
        // JSON text is always valid UTF-8.
        Bytes::from(serde_json::to_vec(&value).expect("Value serialization never fails"))
    }
}

pub(crate) fn decode_sub_payload(payload: Value) -> Option<SubPayload> {
    let arr = payload.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    Some(SubPayload {
        emit_peer: arr[0].as_str()?.to_string(),
        emitter: arr[1].as_str().map(str::to_string),
        recv_peer: arr[2].as_str()?.to_string(),
        receiver: arr[3].as_str().map(str::to_string),
    })
}

fn encode_sub_payload(p: &SubPayload) -> Value {
    json!([
        p.emit_peer,
        p.emitter.clone(),
        p.recv_peer,
        p.receiver.clone()
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_null_roundtrips() {
        let v = Verb::Get(None);
        let decoded = Verb::decode(&v.encode()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn get_names_roundtrips() {
        let v = Verb::Get(Some(vec!["a".into(), "b".into()]));
        let decoded = Verb::decode(&v.encode()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn set_roundtrips() {
        let v = Verb::Set(json!({ "x": { "value": 1 } }));
        let decoded = Verb::decode(&v.encode()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn sub_roundtrips_with_null_receiver() {
        let v = Verb::Sub(SubPayload {
            emit_peer: "a".repeat(32),
            emitter: Some("Emit".into()),
            recv_peer: "b".repeat(32),
            receiver: None,
        });
        let decoded = Verb::decode(&v.encode()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn sig_roundtrips() {
        let v = Verb::Sig("Emit".into(), json!(2.0));
        let decoded = Verb::decode(&v.encode()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn unknown_verb_is_an_error() {
        let err = Verb::decode(br#"{"FROB": 1}"#).unwrap_err();
        assert!(matches!(err, ZocpError::UnknownVerb(k) if k == "FROB"));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = Verb::decode(b"not json").unwrap_err();
        assert!(matches!(err, ZocpError::Decode(_)));
    }

    #[test]
    fn multi_key_frame_is_a_decode_error() {
        let err = Verb::decode(br#"{"GET": null, "SET": {}}"#).unwrap_err();
        assert!(matches!(err, ZocpError::Decode(_)));
    }

    #[test]
    fn call_and_rep_are_reserved_passthrough() {
        let v = Verb::Call(json!(["foo", []]));
        assert_eq!(Verb::decode(&v.encode()).unwrap(), v);
        let v = Verb::Rep(json!("anything"));
        assert_eq!(Verb::decode(&v.encode()).unwrap(), v);
    }
}
