//! Error taxonomy and retry-policy types for the inference protocol.
//!
//! Two tiers exist:
//!
//! - **Fatal** errors ([`ClientError`]) abort the whole session: transport
//!   failures, rejected handshakes, and malformed frames. A malformed frame
//!   breaks the one-request/one-response correlation for the rest of the session.
//! - **Per-item** errors ([`CodecError`], server-reported failures) never
//!   escape [`crate::Session::invoke`]; they are folded into that item's
//!   [`crate::Outcome`].
//!
//! No retry happens anywhere in this crate. [`ClientError::retry_policy`] only
//! tells the caller whether retrying the whole session is sensible.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failed session is worth re-opening.
///
/// Returned by [`ClientError::retry_policy`] so callers can layer their own
/// retry/back-off around the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The failure was transient (e.g. the worker was unreachable); a fresh
    /// session may succeed.
    Retryable,
    /// Retrying with the same inputs will fail the same way (rejected
    /// credential, protocol mismatch, explicit abort).
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::Channel`] or [`crate::Connector`]
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not be established.
    #[error("Could not connect to '{address}': {reason}")]
    Connect {
        /// Address the connector tried to reach.
        address: String,
        /// Transport-level description of the failure.
        reason: String,
    },

    /// The channel was closed (locally or by the peer).
    #[error("Channel closed")]
    Closed,

    /// Any other I/O failure while sending or receiving a frame.
    #[error("Transport I/O error: {message}")]
    Io {
        /// Transport-level description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Builds an [`TransportError::Io`] from anything printable.
    pub fn io(message: impl std::fmt::Display) -> Self {
        Self::Io {
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session-fatal errors
// ---------------------------------------------------------------------------

/// Errors that abort a session.
///
/// [`ClientError::Unreachable`] and [`ClientError::Rejected`] are the two
/// connection failures; [`ClientError::DataFormat`] is the data-format failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transport to the worker could not be established.
    #[error("Can not reach worker at '{address}': {reason}")]
    Unreachable {
        /// Address that was dialled.
        address: String,
        /// Transport-level description of the failure.
        reason: String,
    },

    /// The worker answered the handshake with a non-success status.
    ///
    /// `message` is the server's `message` field verbatim.
    #[error("Can not connect to worker: {message}")]
    Rejected {
        /// Remote diagnostic text.
        message: String,
    },

    /// An inbound frame was malformed, missed a mandatory field, or carried an
    /// unrecognised handshake shape.
    #[error("Invalid message received: {message}")]
    DataFormat {
        /// Which field was missing or which key was unexpected.
        message: String,
    },

    /// The channel failed after it had been opened.
    #[error(transparent)]
    Transport(TransportError),

    /// The session was aborted through its [`crate::AbortHandle`].
    #[error("Session aborted")]
    Aborted,

    /// The blocking entry point could not start its async runtime.
    #[error("Runtime error: {message}")]
    Runtime {
        /// Description of the runtime failure.
        message: String,
    },
}

impl ClientError {
    pub(crate) fn data_format(message: impl Into<String>) -> Self {
        Self::DataFormat {
            message: message.into(),
        }
    }

    /// Returns `true` for failures to establish or authenticate the session.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Rejected { .. })
    }

    /// Returns `true` for malformed or unexpected inbound frames.
    pub fn is_data_format_failure(&self) -> bool {
        matches!(self, Self::DataFormat { .. })
    }

    /// Returns whether re-opening a session after this error may succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Unreachable { .. } | Self::Transport(_) | Self::Runtime { .. } => {
                RetryPolicy::Retryable
            }
            Self::Rejected { .. } | Self::DataFormat { .. } | Self::Aborted => {
                RetryPolicy::NonRetryable
            }
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { address, reason } => Self::Unreachable { address, reason },
            other => Self::Transport(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-item errors
// ---------------------------------------------------------------------------

/// Failure of a [`crate::Codec`] to encode an input or decode an output.
///
/// Always isolated to one item; rendered into the item's failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload variant cannot be handled by this codec.
    #[error("unsupported payload: {0}")]
    Unsupported(String),

    /// The wire value could not be turned back into a payload.
    #[error("{0}")]
    Malformed(String),

    /// Image compression or decompression failed.
    #[error("image codec failed: {0}")]
    Image(String),
}
