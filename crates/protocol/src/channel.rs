//! Channel ports and lifecycle management.
//!
//! [`Channel`] and [`Connector`] are the transport seams: infrastructure crates
//! (e.g. the WebSocket transport) implement them, this crate only drives them.
//! [`ChannelManager`] owns the open → handshake → close lifecycle and
//! guarantees the channel is closed on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{Dispatch, Instrument, debug, info, info_span, warn};

use crate::codec::registry::CodecRegistry;
use crate::errors::{ClientError, TransportError};
use crate::handshake;
use crate::identifiers::{AccessKey, Address, SessionId};
use crate::session::{Session, observed};
use crate::validator::ValidationMode;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// A persistent, ordered, message-oriented duplex conduit.
///
/// Each `send` carries one whole frame and each `receive` yields one whole
/// frame. Implementations are driven strictly one operation at a time.
#[async_trait]
pub trait Channel: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Waits for the next frame.
    ///
    /// Returns [`TransportError::Closed`] once the peer has closed the channel.
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Releases the transport. Must be safe to call more than once and on a
    /// channel that never completed a handshake.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens [`Channel`]s to an address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, address: &Address) -> Result<Box<dyn Channel>, TransportError>;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Everything a session needs besides the transport.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub access_key: AccessKey,
    pub registry: Arc<CodecRegistry>,
    pub validation: ValidationMode,
    /// Logging sink for the handshake and for every call on the resulting
    /// session. `None` logs to the ambient subscriber.
    pub dispatch: Option<Dispatch>,
}

impl SessionOptions {
    /// Options with the default codec registry and relaxed validation.
    pub fn new(access_key: AccessKey) -> Self {
        Self {
            access_key,
            registry: Arc::new(CodecRegistry::default()),
            validation: ValidationMode::default(),
            dispatch: None,
        }
    }
}

/// Opens channels to one address and turns them into ready [`Session`]s.
#[derive(Clone)]
pub struct ChannelManager {
    connector: Arc<dyn Connector>,
    address: Address,
    options: SessionOptions,
}

impl ChannelManager {
    pub fn new(connector: Arc<dyn Connector>, address: Address, options: SessionOptions) -> Self {
        Self {
            connector,
            address,
            options,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Establishes the transport.
    pub async fn open(&self) -> Result<Box<dyn Channel>, ClientError> {
        debug!(address = %self.address, "Opening channel");
        self.connector
            .open(&self.address)
            .await
            .map_err(ClientError::from)
    }

    /// Opens a channel and runs the handshake.
    ///
    /// On handshake failure the channel is closed before the error is returned.
    pub async fn connect(&self) -> Result<Session, ClientError> {
        observed(self.options.dispatch.clone(), self.handshaken()).await
    }

    async fn handshaken(&self) -> Result<Session, ClientError> {
        let id = SessionId::new_random();
        let span = info_span!("session", session_id = %id, address = %self.address);

        async {
            let mut channel = self.open().await?;
            let negotiated = handshake::negotiate(
                channel.as_mut(),
                &self.options.access_key,
                &self.options.registry,
                self.options.validation,
            )
            .await;

            match negotiated {
                Ok(codecs) => {
                    info!(
                        input = codecs.input.name(),
                        output = codecs.output.name(),
                        "Successfully connected to worker"
                    );
                    Ok(Session::new(
                        id,
                        channel,
                        codecs,
                        self.options.validation,
                        tracing::Span::current(),
                        self.options.dispatch.clone(),
                    ))
                }
                Err(err) => {
                    warn!(error = %err, "Handshake failed");
                    close_quietly(channel.as_mut()).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs `body` on a fresh session and closes it afterwards, whatever
    /// `body` returns.
    ///
    /// A panic inside `body` unwinds through here; the channel is then
    /// released by its `Drop` implementation instead of an orderly close.
    pub async fn scoped<T, F>(&self, body: F) -> Result<T, ClientError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, ClientError>>,
    {
        let run = async move {
            let mut session = self.connect().await?;
            let result = body(&mut session).await;
            session.close().await;
            result
        };
        observed(self.options.dispatch.clone(), run).await
    }
}

/// Closes `channel`, logging instead of propagating a failure so that the
/// caller's original error stays the one reported.
pub(crate) async fn close_quietly(channel: &mut dyn Channel) {
    if let Err(err) = channel.close().await {
        warn!(error = %err, "Failed to close channel cleanly");
    } else {
        debug!("Channel closed");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::payload::Outcome;
    use crate::testing::{ScriptedChannel, ScriptedConnector, frame};

    fn manager(connector: ScriptedConnector) -> ChannelManager {
        ChannelManager::new(
            Arc::new(connector),
            Address::new("ws://worker").unwrap(),
            SessionOptions::new(AccessKey::new("good:access_key").unwrap()),
        )
    }

    fn current_handshake() -> Vec<u8> {
        frame(json!({
            "status": "success",
            "workload_typing": {"input": "dict", "output": "dict"},
        }))
    }

    #[tokio::test]
    async fn test_registration_carries_credential_twice() {
        let channel = ScriptedChannel::echo(current_handshake());
        let probe = channel.probe();

        let session = manager(ScriptedConnector::new([channel])).connect().await.unwrap();
        session.close().await;

        assert_eq!(
            probe.sent()[0],
            json!({
                "action": "Registration",
                "data": "good:access_key",
                "access_key": "good:access_key",
            })
        );
    }

    #[tokio::test]
    async fn test_rejected_handshake_closes_channel() {
        let channel =
            ScriptedChannel::with_replies(vec![frame(json!({"status": "fail", "message": "bad key"}))]);
        let probe = channel.probe();

        let err = manager(ScriptedConnector::new([channel])).connect().await.unwrap_err();

        assert!(err.is_connection_failure());
        assert!(err.to_string().contains("bad key"));
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn test_missing_types_closes_channel() {
        let channel =
            ScriptedChannel::with_replies(vec![frame(json!({"status": "success", "data": {}}))]);
        let probe = channel.probe();

        let err = manager(ScriptedConnector::new([channel])).connect().await.unwrap_err();

        assert!(err.is_data_format_failure());
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_connection_failure() {
        let err = manager(ScriptedConnector::unreachable()).connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_scoped_closes_on_success_and_on_error() {
        let ok = ScriptedChannel::echo(current_handshake());
        let failing = ScriptedChannel::with_replies(vec![
            current_handshake(),
            frame(json!({"status": "success"})),
        ]);
        let (ok_probe, failing_probe) = (ok.probe(), failing.probe());
        let manager = manager(ScriptedConnector::new([ok, failing]));

        let outcomes = manager
            .scoped(|session| Box::pin(async move { session.invoke(json!("a"), None, None).await }))
            .await
            .unwrap();
        assert_eq!(outcomes, vec![Outcome::Success(json!("a").into())]);
        assert_eq!(ok_probe.close_count(), 1);

        let err = manager
            .scoped(|session| Box::pin(async move { session.invoke(json!("b"), None, None).await }))
            .await
            .unwrap_err();
        assert!(err.is_data_format_failure());
        assert_eq!(failing_probe.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_result() {
        let channel = ScriptedChannel::echo(current_handshake()).failing_close();
        let probe = channel.probe();

        let outcomes = manager(ScriptedConnector::new([channel]))
            .scoped(|session| Box::pin(async move { session.invoke(json!(7), None, None).await }))
            .await
            .unwrap();

        assert_eq!(outcomes, vec![Outcome::Success(json!(7).into())]);
        assert!(probe.is_closed());
    }
}
