//! i2 inference client.
//!
//! Facade over the [`protocol`] engine and the WebSocket transport. Three
//! ways to use it:
//!
//! - [`Client::inference`]: blocking; opens, handshakes, invokes, closes.
//! - [`Client::async_inference`]: the same, as a future.
//! - [`Client::with_session`] / [`Client::connect`]: keep one handshaken
//!   channel for many calls (e.g. a video stream).
//!
//! ## Architectural Layer
//!
//! **Composition.** Wires a [`protocol::Connector`], the shared
//! [`protocol::CodecRegistry`], and an optional logging sink. Contains no
//! protocol rules of its own.

pub mod config;
pub mod observability;

use std::sync::Arc;

use futures::future::BoxFuture;
use protocol::{
    AccessKey, Address, Batch, ChannelManager, ClientError, Codec, CodecRegistry, Connector,
    Outcome, Session, SessionOptions, ValidationMode,
};
use tracing::Dispatch;
use transport_websocket::WebSocketConnector;

pub use config::{ClientConfig, ConfigError};
pub use observability::LogFormat;

/// A handle on one worker endpoint.
///
/// Cheap to clone; clones share the codec registry and logging sink. Each
/// call opens its own channel, so clones may be used from parallel tasks.
///
/// An injected logging sink covers the handshake and every call on the
/// sessions the client hands out, including [`Client::connect`] sessions
/// that outlive the call that opened them.
#[derive(Clone)]
pub struct Client {
    manager: ChannelManager,
}

impl Client {
    /// A WebSocket client with the default codec registry.
    pub fn new(url: Address, access_key: AccessKey) -> Self {
        Self::builder(url, access_key).build()
    }

    /// A WebSocket client logging to stderr at the configured verbosity and
    /// format.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::builder(config.url.clone(), config.access_key.clone())
            .validation(config.validation)
            .observability(observability::sink(config.verbose, config.log_format))
            .build()
    }

    pub fn builder(url: Address, access_key: AccessKey) -> ClientBuilder {
        ClientBuilder {
            url,
            access_key,
            registry: None,
            validation: ValidationMode::default(),
            connector: None,
            dispatch: None,
        }
    }

    pub fn address(&self) -> &Address {
        self.manager.address()
    }

    /// Opens a channel and runs the handshake. The caller must
    /// [`Session::close`] the returned session.
    pub async fn connect(&self) -> Result<Session, ClientError> {
        self.manager.connect().await
    }

    /// Runs `body` on a fresh session, closing it on every exit path.
    pub async fn with_session<T, F>(&self, body: F) -> Result<T, ClientError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, ClientError>>,
    {
        self.manager.scoped(body).await
    }

    /// Opens a session, sends `items`, and closes the session.
    pub async fn async_inference(
        &self,
        items: impl Into<Batch>,
        encode: Option<&Codec>,
        decode: Option<&Codec>,
    ) -> Result<Vec<Outcome>, ClientError> {
        let batch = items.into();
        let (encode, decode) = (encode.cloned(), decode.cloned());
        self.with_session(move |session| {
            Box::pin(async move {
                session
                    .invoke(batch, encode.as_ref(), decode.as_ref())
                    .await
            })
        })
        .await
    }

    /// Blocking [`Client::async_inference`] on a private current-thread runtime.
    ///
    /// Fails with [`ClientError::Runtime`] when called from inside an async
    /// runtime; use [`Client::async_inference`] there.
    pub fn inference(
        &self,
        items: impl Into<Batch>,
        encode: Option<&Codec>,
        decode: Option<&Codec>,
    ) -> Result<Vec<Outcome>, ClientError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ClientError::Runtime {
                message: "blocking inference called from within an async runtime".into(),
            });
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::Runtime {
                message: e.to_string(),
            })?;

        rt.block_on(self.async_inference(items, encode, decode))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", self.manager.address())
            .field("validation", &self.manager.options().validation)
            .field("observed", &self.manager.options().dispatch.is_some())
            .finish_non_exhaustive()
    }
}

/// Configures a [`Client`].
pub struct ClientBuilder {
    url: Address,
    access_key: AccessKey,
    registry: Option<Arc<CodecRegistry>>,
    validation: ValidationMode,
    connector: Option<Arc<dyn Connector>>,
    dispatch: Option<Dispatch>,
}

impl ClientBuilder {
    /// Codec registry consulted at handshake time (default: built-in presets).
    pub fn registry(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    /// Transport used to open channels (default: WebSocket).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Logging sink for every handshake and every session call.
    pub fn observability(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Client {
        let options = SessionOptions {
            access_key: self.access_key,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(CodecRegistry::default())),
            validation: self.validation,
            dispatch: self.dispatch,
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        Client {
            manager: ChannelManager::new(connector, self.url, options),
        }
    }
}
