//! In-memory channel doubles for tests.
//!
//! [`ScriptedChannel`] plays the worker's side of a session: each frame the
//! client sends is recorded and handed to a responder, whose reply (if any)
//! is queued for the next `receive`. With nothing queued, `receive` waits
//! forever, which is what an idle worker looks like.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::channel::{Channel, Connector};
use crate::errors::TransportError;
use crate::identifiers::Address;

/// Packs a JSON value as a MessagePack map frame.
pub fn frame(value: Value) -> Vec<u8> {
    rmp_serde::to_vec_named(&value).expect("json values always pack")
}

/// Unpacks a frame recorded by a [`ScriptedChannel`].
pub fn unpack(frame: &[u8]) -> Value {
    rmp_serde::from_slice(frame).expect("recorded frames are valid msgpack")
}

type Responder = Box<dyn FnMut(&Value) -> Option<Vec<u8>> + Send>;

/// Observes a [`ScriptedChannel`] after it has been handed to a session.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<Mutex<usize>>,
}

impl Probe {
    /// Frames sent by the client so far, unpacked.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().iter().map(|f| unpack(f)).collect()
    }

    /// Whether `close` was called at least once.
    pub fn is_closed(&self) -> bool {
        *self.closes.lock().unwrap() > 0
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

/// A scripted worker.
pub struct ScriptedChannel {
    responder: Responder,
    pending: VecDeque<Vec<u8>>,
    probe: Probe,
    closed: bool,
    fail_close: bool,
}

impl ScriptedChannel {
    /// Answers the n-th request with the n-th reply; once the replies run out
    /// the worker goes silent.
    pub fn with_replies(replies: Vec<Vec<u8>>) -> Self {
        let mut replies = VecDeque::from(replies);
        Self::with_responder(move |_| replies.pop_front())
    }

    /// Accepts the handshake with `handshake_reply`, then echoes every
    /// inference request's `data` back as a success.
    pub fn echo(handshake_reply: Vec<u8>) -> Self {
        let mut handshake = Some(handshake_reply);
        Self::with_responder(move |request| match handshake.take() {
            Some(reply) => Some(reply),
            None => Some(frame(json!({"status": "success", "data": request["data"].clone()}))),
        })
    }

    pub fn with_responder(
        responder: impl FnMut(&Value) -> Option<Vec<u8>> + Send + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            probe: Probe::default(),
            closed: false,
            fail_close: false,
        }
    }

    /// Makes `close` report an error (after recording the call).
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let request = unpack(&frame);
        self.probe.sent.lock().unwrap().push(frame);
        if let Some(reply) = (self.responder)(&request) {
            self.pending.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.pending.pop_front() {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        *self.probe.closes.lock().unwrap() += 1;
        if self.fail_close {
            return Err(TransportError::io("close frame rejected"));
        }
        Ok(())
    }
}

/// Hands out pre-built channels, one per `open`, in order.
///
/// Once exhausted, `open` fails like an unreachable worker.
#[derive(Default)]
pub struct ScriptedConnector {
    channels: Mutex<VecDeque<ScriptedChannel>>,
}

impl ScriptedConnector {
    pub fn new(channels: impl IntoIterator<Item = ScriptedChannel>) -> Self {
        Self {
            channels: Mutex::new(channels.into_iter().collect()),
        }
    }

    /// A connector whose every `open` fails.
    pub fn unreachable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, address: &Address) -> Result<Box<dyn Channel>, TransportError> {
        let next = self.channels.lock().unwrap().pop_front();
        match next {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(TransportError::Connect {
                address: address.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}
