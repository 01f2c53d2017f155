//! One-time registration exchange and codec negotiation.
//!
//! The worker answers the Registration envelope with its declared input and
//! output types, in one of two shapes (checked in this order):
//!
//! | Generation | Shape |
//! |------------|-------|
//! | current | `{"status": "success", "workload_typing": {"input": .., "output": ..}}` |
//! | legacy  | `{"status": "success", "data": {"input_type": .., "output_type": ..}}` |
//!
//! Legacy tags may carry a namespace prefix (`"numpy.ndarray"`), stripped
//! before lookup. Each side is then resolved against the [`CodecRegistry`]
//! independently; an unknown or missing tag binds [`Codec::Identity`] and
//! logs a warning rather than failing.

use serde_json::Value;
use tracing::{info, warn};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::codec::registry::CodecRegistry;
use crate::envelope;
use crate::errors::ClientError;
use crate::identifiers::{AccessKey, TypeTag};
use crate::validator::{self, ValidationMode};

const WORKLOAD_TYPING: &str = "workload_typing";

/// Types a worker declared during the handshake. `None` means the worker did
/// not declare one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredTypes {
    pub input: Option<TypeTag>,
    pub output: Option<TypeTag>,
}

/// Default codecs of a session, one per side.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedCodecs {
    pub input: Codec,
    pub output: Codec,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Input,
    Output,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    fn argument(self) -> &'static str {
        match self {
            Self::Input => "encode",
            Self::Output => "decode",
        }
    }
}

/// Runs the registration exchange on a freshly opened channel.
///
/// Does not close the channel on failure; the caller owns it.
pub async fn negotiate(
    channel: &mut dyn Channel,
    access_key: &AccessKey,
    registry: &CodecRegistry,
    mode: ValidationMode,
) -> Result<NegotiatedCodecs, ClientError> {
    let request = envelope::registration(access_key).map_err(|e| {
        ClientError::data_format(format!("could not pack registration: {e}"))
    })?;
    channel.send(request).await?;

    let reply = channel.receive().await?;
    let declared = parse_registration(&reply, mode)?;
    Ok(resolve(&declared, registry))
}

/// Validates a registration response and extracts the declared types.
pub fn parse_registration(frame: &[u8], mode: ValidationMode) -> Result<DeclaredTypes, ClientError> {
    let response = validator::validate_envelope(frame, mode, &[WORKLOAD_TYPING])?;

    if !response.is_success() {
        return Err(ClientError::Rejected {
            message: response.message().unwrap_or_default().to_owned(),
        });
    }

    if let Some(typing) = response.field(WORKLOAD_TYPING) {
        return declared_from(typing, "input", "output", tag_from_current);
    }
    if let Some(data) = response.data() {
        return declared_from(data, "input_type", "output_type", tag_from_legacy);
    }
    Err(ClientError::data_format("missing types"))
}

fn declared_from(
    value: &Value,
    input_key: &str,
    output_key: &str,
    to_tag: fn(&str) -> Option<TypeTag>,
) -> Result<DeclaredTypes, ClientError> {
    let Value::Object(map) = value else {
        return Err(ClientError::data_format("missing types"));
    };

    let side = |key: &str| match map.get(key) {
        Some(Value::String(raw)) => Ok(to_tag(raw)),
        Some(Value::Null) => Ok(None),
        Some(_) => Err(ClientError::data_format(format!("'{key}' must be a string"))),
        None => Err(ClientError::data_format(format!("missing types: no '{key}' key"))),
    };

    Ok(DeclaredTypes {
        input: side(input_key)?,
        output: side(output_key)?,
    })
}

fn tag_from_current(raw: &str) -> Option<TypeTag> {
    if raw == TypeTag::UNDECLARED {
        return None;
    }
    TypeTag::new(raw)
}

fn tag_from_legacy(raw: &str) -> Option<TypeTag> {
    if raw == TypeTag::UNDECLARED {
        return None;
    }
    TypeTag::from_legacy(raw)
}

/// Binds each declared type to a codec from `registry`.
pub fn resolve(declared: &DeclaredTypes, registry: &CodecRegistry) -> NegotiatedCodecs {
    NegotiatedCodecs {
        input: resolve_side(Side::Input, declared.input.as_ref(), registry),
        output: resolve_side(Side::Output, declared.output.as_ref(), registry),
    }
}

fn resolve_side(side: Side, tag: Option<&TypeTag>, registry: &CodecRegistry) -> Codec {
    let Some(tag) = tag else {
        warn!(
            side = side.label(),
            "No {} type provided by worker. Provide a codec with the '{}' argument.",
            side.label(),
            side.argument()
        );
        return Codec::Identity;
    };

    match registry.get(tag.as_str()) {
        Some(codec) => {
            info!(side = side.label(), tag = %tag, codec = codec.name(), "Resolved codec");
            codec.clone()
        }
        None => {
            warn!(
                side = side.label(),
                tag = %tag,
                "Unknown {} type provided by worker. Provide a codec with the '{}' argument.",
                side.label(),
                side.argument()
            );
            Codec::Identity
        }
    }
}
