//! WebSocket transport for the i2 protocol.
//!
//! Implements [`protocol::Connector`] and [`protocol::Channel`] with
//! `tokio-tungstenite`. Every protocol frame travels as one binary WebSocket
//! message; ping/pong traffic is handled by tungstenite and skipped here.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection setup, WebSocket framing, and close
//! handshakes live here. The [`protocol`] crate sees only the trait objects.
//!
//! `wss://` addresses need the `tls` feature.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use protocol::{Address, Channel, Connector, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

/// Opens [`WebSocketChannel`]s with `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, address: &Address) -> Result<Box<dyn Channel>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(address.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        debug!(%address, status = %response.status(), "WebSocket upgrade accepted");
        Ok(Box::new(WebSocketChannel::new(stream)))
    }
}

/// A [`Channel`] over any WebSocket stream.
pub struct WebSocketChannel<S> {
    stream: WebSocketStream<S>,
    closed: bool,
}

impl<S> WebSocketChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-upgraded WebSocket stream.
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::io(format!("websocket: {other}")),
    }
}

#[async_trait]
impl<S> Channel for WebSocketChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        trace!(bytes = frame.len(), "Sending frame");
        self.stream
            .send(Message::binary(frame))
            .await
            .map_err(map_ws_error)
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        loop {
            let Some(message) = self.stream.next().await else {
                self.closed = true;
                return Err(TransportError::Closed);
            };

            match message.map_err(map_ws_error)? {
                Message::Binary(data) => {
                    trace!(bytes = data.len(), "Received frame");
                    return Ok(data.to_vec());
                }
                // Some peers send packed frames as text; the bytes are the same.
                Message::Text(text) => return Ok(text.as_bytes().to_vec()),
                Message::Close(reason) => {
                    debug!(?reason, "Peer closed the channel");
                    self.closed = true;
                    return Err(TransportError::Closed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(other) => Err(TransportError::io(format!("websocket close: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connected client/server channels over an in-process duplex pipe.
    async fn pair() -> (
        WebSocketChannel<tokio::io::DuplexStream>,
        WebSocketChannel<tokio::io::DuplexStream>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client, server) = tokio::join!(
            async {
                tokio_tungstenite::client_async("ws://localhost/", client_io)
                    .await
                    .expect("client handshake failed")
                    .0
            },
            async {
                tokio_tungstenite::accept_async(server_io)
                    .await
                    .expect("server handshake failed")
            }
        );
        (WebSocketChannel::new(client), WebSocketChannel::new(server))
    }

    #[tokio::test]
    async fn test_frames_cross_in_order() {
        let (mut a, mut b) = pair().await;

        a.send(b"first".to_vec()).await.unwrap();
        a.send(b"second".to_vec()).await.unwrap();

        assert_eq!(b.receive().await.unwrap(), b"first");
        assert_eq!(b.receive().await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_peer_close_surfaces_as_closed() {
        let (mut a, mut b) = pair().await;

        let closer = tokio::spawn(async move {
            a.close().await.unwrap();
            // Closing twice is a no-op.
            a.close().await.unwrap();
            a
        });

        assert_eq!(b.receive().await, Err(TransportError::Closed));
        assert!(b.is_closed());
        assert_eq!(b.send(b"late".to_vec()).await, Err(TransportError::Closed));

        let a = closer.await.unwrap();
        assert!(a.is_closed());
    }
}
