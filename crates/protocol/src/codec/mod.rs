//! Codecs marshal [`Payload`]s to and from wire values.
//!
//! A [`Codec`] is a value, not a trait object hierarchy: the built-in presets
//! are enum variants and application-supplied codecs are
//! [`Codec::Custom`] function pairs. Sessions resolve one codec per side
//! (input/output) at handshake time and store it by value; cloning a codec
//! shares the underlying functions.

pub mod pixels;
pub mod registry;

use std::sync::Arc;

use serde_json::Value;

use crate::errors::CodecError;
use crate::payload::Payload;

/// Encode half of a custom codec.
pub type EncodeFn = Arc<dyn Fn(Payload) -> Result<Value, CodecError> + Send + Sync>;

/// Decode half of a custom codec.
pub type DecodeFn = Arc<dyn Fn(Value) -> Result<Payload, CodecError> + Send + Sync>;

/// An encode/decode pair bound to a declared type tag.
#[derive(Clone)]
pub enum Codec {
    /// Pass-through. Bound when the worker's declared type is unknown.
    Identity,
    /// Structured values only (the "dict" preset).
    Json,
    /// Pixel buffers as base64 PNG text (the "ndarray" preset).
    Image,
    /// Application-supplied functions.
    Custom {
        encode: EncodeFn,
        decode: DecodeFn,
    },
}

impl Codec {
    /// Builds a [`Codec::Custom`] from two closures.
    pub fn custom<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(Payload) -> Result<Value, CodecError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Payload, CodecError> + Send + Sync + 'static,
    {
        Self::Custom {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Short name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Json => "json",
            Self::Image => "image",
            Self::Custom { .. } => "custom",
        }
    }

    /// Turns an input payload into the value placed in the request's `data`.
    pub fn encode(&self, payload: Payload) -> Result<Value, CodecError> {
        match (self, payload) {
            (Self::Identity | Self::Json, Payload::Json(value)) => Ok(value),
            (Self::Identity, Payload::Image(img)) => {
                serde_json::to_value(img).map_err(|e| CodecError::Malformed(e.to_string()))
            }
            (Self::Json, payload @ Payload::Image(_)) => Err(CodecError::Unsupported(format!(
                "json codec cannot encode {} payloads",
                payload.kind()
            ))),
            (Self::Image, Payload::Image(img)) => pixels::encode(&img).map(Value::String),
            (Self::Image, payload @ Payload::Json(_)) => Err(CodecError::Unsupported(format!(
                "image codec cannot encode {} payloads",
                payload.kind()
            ))),
            (Self::Custom { encode, .. }, payload) => encode(payload),
        }
    }

    /// Turns a response's `data` value into an output payload.
    pub fn decode(&self, value: Value) -> Result<Payload, CodecError> {
        match self {
            Self::Identity | Self::Json => Ok(Payload::Json(value)),
            Self::Image => match value {
                Value::String(text) => pixels::decode(&text).map(Payload::Image),
                other => Err(CodecError::Malformed(format!(
                    "expected base64 image text, got {}",
                    crate::envelope::json_kind(&other)
                ))),
            },
            Self::Custom { decode, .. } => decode(value),
        }
    }
}

impl PartialEq for Codec {
    /// Presets compare by variant; custom codecs compare by identity of their
    /// function objects.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Identity, Self::Identity)
            | (Self::Json, Self::Json)
            | (Self::Image, Self::Image) => true,
            (
                Self::Custom {
                    encode: e1,
                    decode: d1,
                },
                Self::Custom {
                    encode: e2,
                    decode: d2,
                },
            ) => Arc::ptr_eq(e1, e2) && Arc::ptr_eq(d1, d2),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Codec::{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::payload::PixelBuffer;

    #[test]
    fn test_identity_passes_json_through() {
        assert_eq!(Codec::Identity.encode(json!(5).into()).unwrap(), json!(5));
        assert_eq!(
            Codec::Identity.decode(json!({"a": 1})).unwrap(),
            Payload::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_presets_reject_foreign_payloads() {
        let img = PixelBuffer::new(1, 1, 1, vec![7]).unwrap();
        assert!(matches!(
            Codec::Json.encode(img.into()),
            Err(CodecError::Unsupported(_))
        ));
        assert!(matches!(
            Codec::Image.encode(json!({"a": 1}).into()),
            Err(CodecError::Unsupported(_))
        ));
        assert!(matches!(
            Codec::Image.decode(json!(3)),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_custom_codec_equality_is_identity() {
        let doubler = Codec::custom(
            |p| match p {
                Payload::Json(v) => Ok(json!(v.as_i64().unwrap_or(0) * 2)),
                other => Err(CodecError::Unsupported(other.kind().into())),
            },
            |v| Ok(Payload::Json(v)),
        );
        let same = doubler.clone();
        let other = Codec::custom(|_| Ok(Value::Null), |v| Ok(Payload::Json(v)));

        assert_eq!(doubler, same);
        assert_ne!(doubler, other);
        assert_ne!(doubler, Codec::Identity);
        assert_eq!(doubler.encode(json!(21).into()).unwrap(), json!(42));
    }
}
