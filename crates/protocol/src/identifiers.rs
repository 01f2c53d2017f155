//! Newtype identifiers used across the protocol.
//!
//! Each concept with an identity gets its own type so that, for example, a
//! [`TypeTag`] is never passed where an [`Address`] is expected even though
//! both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Declared wire type of a worker's input or output (e.g. `"ndarray"`).
    ///
    /// Matched by exact string comparison against the [`crate::CodecRegistry`].
    TypeTag
}

string_id! {
    /// Location of a worker endpoint, e.g. `"ws://127.0.0.1:8000"`.
    Address
}

impl TypeTag {
    /// Tag value the legacy handshake uses to mean "no type declared".
    pub const UNDECLARED: &'static str = "None";

    /// Strips a legacy namespace prefix (`"numpy.ndarray"` → `"ndarray"`).
    ///
    /// Returns `None` when nothing remains after stripping.
    pub fn from_legacy(value: &str) -> Option<Self> {
        let stripped = value.rsplit('.').next().unwrap_or(value);
        Self::new(stripped)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Opaque credential presented during the handshake (observed shape
/// `"<role>:<uuid>"`).
///
/// Never parsed by the client. `Debug` and `Display` are redacted so the
/// value does not leak into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    /// Wraps a credential, returning `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() { None } else { Some(Self(v)) }
    }

    /// Returns the raw credential for transmission.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

// ---------------------------------------------------------------------------
// Session identity
// ---------------------------------------------------------------------------

/// Identifies one open-handshake-close lifetime of a channel.
///
/// Generated locally and recorded on the `session` tracing span so every event
/// from one session can be correlated. Never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random session identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
