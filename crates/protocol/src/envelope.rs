//! Envelope framing: MessagePack maps exchanged over the channel.
//!
//! Outbound envelopes are serialised with named fields so the peer sees a map
//! (`{"action": ..., "data": ...}`), never a positional array. Inbound frames
//! are decoded into a [`serde_json::Map`] before validation.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::AccessKey;
use crate::errors::ClientError;

/// Action tag carried by every outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    /// One-time handshake carrying the credential.
    Registration,
    /// One inference request.
    Inference,
}

#[derive(Serialize)]
struct Outbound<'a, D: Serialize> {
    action: Action,
    data: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key: Option<&'a str>,
}

/// Packs the Registration envelope.
///
/// The credential is emitted twice: under `data` and under the older
/// `access_key` field name that earlier workers still read.
pub fn registration(key: &AccessKey) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(&Outbound {
        action: Action::Registration,
        data: key.expose(),
        access_key: Some(key.expose()),
    })
}

/// Packs an Inference envelope around an already-encoded payload.
pub fn inference(data: &Value) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(&Outbound {
        action: Action::Inference,
        data,
        access_key: None,
    })
}

/// Decodes one inbound frame into its top-level map.
///
/// Fails with a data-format error when the bytes are not exactly one
/// MessagePack value, or the top-level value is not a map with string keys.
/// NaN and infinite floats have no JSON form and are rejected the same way.
pub fn decode(frame: &[u8]) -> Result<Map<String, Value>, ClientError> {
    let mut cursor = Cursor::new(frame);
    let WireValue(value) = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        WireValue::deserialize(&mut de)
            .map_err(|e| ClientError::data_format(format!("frame is not valid msgpack: {e}")))?
    };
    let consumed = cursor.position() as usize;
    if consumed != frame.len() {
        return Err(ClientError::data_format(format!(
            "frame must be one msgpack value, found {} trailing bytes",
            frame.len() - consumed
        )));
    }

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::data_format(format!(
            "expected a map, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

// ---------------------------------------------------------------------------
// Inbound value decoding
// ---------------------------------------------------------------------------

/// A [`serde_json::Value`] that also accepts MessagePack `bin` data.
///
/// `bin` holding valid UTF-8 (typically base64 text sent as bytes) becomes a
/// string verbatim; any other bytes become their base64 text.
struct WireValue(Value);

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor).map(WireValue)
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("any msgpack value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| E::custom(format!("non-finite float {v}")))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::String(match std::str::from_utf8(v) {
            Ok(text) => text.to_owned(),
            Err(_) => STANDARD.encode(v),
        }))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::String(match String::from_utf8(v) {
            Ok(text) => text,
            Err(e) => STANDARD.encode(e.into_bytes()),
        }))
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        WireValue::deserialize(deserializer).map(|w| w.0)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(WireValue(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = Map::new();
        while let Some((key, WireValue(value))) = access.next_entry::<String, WireValue>()? {
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_registration_duplicates_credential() {
        let key = AccessKey::new("access:1234").unwrap();
        let frame = registration(&key).unwrap();
        let map = decode(&frame).unwrap();
        assert_eq!(map["action"], json!("Registration"));
        assert_eq!(map["data"], json!("access:1234"));
        assert_eq!(map["access_key"], json!("access:1234"));
    }

    #[test]
    fn test_inference_envelope_has_no_access_key() {
        let frame = inference(&json!({"x": [1, 2]})).unwrap();
        let map = decode(&frame).unwrap();
        assert_eq!(map["action"], json!("Inference"));
        assert_eq!(map["data"], json!({"x": [1, 2]}));
        assert!(!map.contains_key("access_key"));
    }

    #[test]
    fn test_bin_values_become_strings() {
        #[derive(Serialize)]
        struct Raw<'a> {
            status: &'a str,
            #[serde(with = "serde_bytes_compat")]
            data: &'a [u8],
        }

        mod serde_bytes_compat {
            pub fn serialize<S: serde::Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bytes(v)
            }
        }

        let text = rmp_serde::to_vec_named(&Raw {
            status: "success",
            data: b"aGVsbG8=",
        })
        .unwrap();
        assert_eq!(decode(&text).unwrap()["data"], json!("aGVsbG8="));

        let binary = rmp_serde::to_vec_named(&Raw {
            status: "success",
            data: &[0xff, 0x00],
        })
        .unwrap();
        assert_eq!(decode(&binary).unwrap()["data"], json!("/wA="));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut frame = rmp_serde::to_vec_named(&json!({"status": "success", "data": 1})).unwrap();
        assert!(decode(&frame).is_ok());

        frame.extend_from_slice(&rmp_serde::to_vec(&7u8).unwrap());
        let err = decode(&frame).unwrap_err();
        assert!(err.is_data_format_failure());
        assert!(err.to_string().contains("1 trailing bytes"), "{err}");
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let frame =
            rmp_serde::to_vec_named(&std::collections::BTreeMap::from([("data", f64::NAN)]))
                .unwrap();
        assert!(decode(&frame).unwrap_err().is_data_format_failure());
    }

    #[test]
    fn test_non_map_frames_are_rejected() {
        let frame = rmp_serde::to_vec(&"zbl").unwrap();
        let err = decode(&frame).unwrap_err();
        assert!(err.is_data_format_failure());

        let err = decode(b"zbl").unwrap_err();
        assert!(err.is_data_format_failure());
    }
}
