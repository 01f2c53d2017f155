//! Client-side engine of the i2 inference protocol.
//!
//! A caller opens a persistent channel to a worker, performs a one-time
//! handshake that negotiates the worker's input and output types, then sends
//! any number of inference batches. Every batch yields one [`Outcome`] per
//! input, in input order.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate defines the transport
//! seams ([`Channel`], [`Connector`]) but implements none over a network;
//! infrastructure crates such as `transport-websocket` supply them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtypes (`TypeTag`, `Address`, `AccessKey`, `SessionId`) |
//! | [`payload`] | Inputs/outputs (`Payload`, `PixelBuffer`, `Batch`, `Outcome`) |
//! | [`envelope`] | MessagePack framing of outbound and inbound envelopes |
//! | [`validator`] | Structural checks on every inbound frame |
//! | [`codec`] | `Codec` presets, the PNG image codec, `CodecRegistry` |
//! | [`handshake`] | Registration exchange and codec negotiation |
//! | [`channel`] | Transport ports and `ChannelManager` lifecycle |
//! | [`session`] | `Session` and the per-item invoker |
//! | [`errors`] | `ClientError`, `TransportError`, `CodecError`, `RetryPolicy` |
//!
//! ## Session lifecycle
//!
//! ```text
//! Closed --open--> Handshaking --success--> Ready --invoke*--> Ready --close--> Closed
//!                  Handshaking --failure--> Closed (error surfaced to the opener)
//! ```

pub mod channel;
pub mod codec;
pub mod envelope;
pub mod errors;
pub mod handshake;
pub mod identifiers;
pub mod payload;
pub mod session;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use channel::{Channel, ChannelManager, Connector, SessionOptions};
pub use codec::registry::CodecRegistry;
pub use codec::{Codec, DecodeFn, EncodeFn};
pub use errors::{ClientError, CodecError, RetryPolicy, TransportError};
pub use handshake::{DeclaredTypes, NegotiatedCodecs};
pub use identifiers::{AccessKey, Address, SessionId, TypeTag};
pub use payload::{Batch, Outcome, Payload, PixelBuffer};
pub use session::{AbortHandle, Session};
pub use validator::{Response, ValidationMode};
