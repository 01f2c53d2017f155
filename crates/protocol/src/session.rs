//! A handshaken channel and the per-item request/response invoker.
//!
//! A [`Session`] only exists after a successful handshake and is consumed by
//! [`Session::close`], so invoking before the handshake or after close cannot
//! be expressed. `invoke` takes `&mut self`: one request is in flight at a
//! time, and response N always answers request N without any message id.

use std::future::Future;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, Span, debug};

use crate::channel::{Channel, close_quietly};
use crate::codec::Codec;
use crate::envelope;
use crate::errors::{ClientError, TransportError};
use crate::handshake::NegotiatedCodecs;
use crate::identifiers::SessionId;
use crate::payload::{Batch, Outcome, Payload};
use crate::validator::{self, ValidationMode};

/// Aborts a session from another task.
///
/// Triggering it resolves any pending send or receive on the session with
/// [`ClientError::Aborted`]; every later call fails the same way.
#[derive(Debug, Clone)]
pub struct AbortHandle(CancellationToken);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// A ready channel with its negotiated default codecs.
pub struct Session {
    id: SessionId,
    channel: Box<dyn Channel>,
    codecs: NegotiatedCodecs,
    validation: ValidationMode,
    abort: CancellationToken,
    /// Set by the first fatal error; the channel's request/response pairing
    /// can no longer be trusted afterwards.
    failed: Option<ClientError>,
    span: Span,
    dispatch: Option<Dispatch>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        channel: Box<dyn Channel>,
        codecs: NegotiatedCodecs,
        validation: ValidationMode,
        span: Span,
        dispatch: Option<Dispatch>,
    ) -> Self {
        Self {
            id,
            channel,
            codecs,
            validation,
            abort: CancellationToken::new(),
            failed: None,
            span,
            dispatch,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Default codecs resolved during the handshake.
    pub fn codecs(&self) -> &NegotiatedCodecs {
        &self.codecs
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.abort.clone())
    }

    /// Sends each item in order and collects one [`Outcome`] per item.
    ///
    /// `encode`/`decode` override the negotiated codecs for this call only.
    /// Encode failures, decode failures and server-reported failures are
    /// isolated to their item. A transport failure or an invalid response
    /// frame aborts the whole call and leaves the session unusable.
    pub async fn invoke(
        &mut self,
        items: impl Into<Batch>,
        encode: Option<&Codec>,
        decode: Option<&Codec>,
    ) -> Result<Vec<Outcome>, ClientError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        let batch = items.into();
        let encoder = encode.unwrap_or(&self.codecs.input).clone();
        let decoder = decode.unwrap_or(&self.codecs.output).clone();
        let span = self.span.clone();
        let dispatch = self.dispatch.clone();

        let run = async {
            debug!(
                items = batch.len(),
                encode = encoder.name(),
                decode = decoder.name(),
                "Starting inference"
            );
            let mut outcomes = Vec::with_capacity(batch.len());
            for (index, item) in batch.into_items().into_iter().enumerate() {
                match self.exchange(index, item, &encoder, &decoder).await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => {
                        self.failed = Some(err.clone());
                        return Err(err);
                    }
                }
            }
            Ok(outcomes)
        }
        .instrument(span);
        observed(dispatch, run).await
    }

    async fn exchange(
        &mut self,
        index: usize,
        item: Payload,
        encoder: &Codec,
        decoder: &Codec,
    ) -> Result<Outcome, ClientError> {
        let wire = match encoder.encode(item) {
            Ok(wire) => wire,
            Err(err) => {
                debug!(index, error = %err, "Input encoding failed");
                return Ok(Outcome::Failure(format!("failed to encode input: {err}")));
            }
        };
        let request = match envelope::inference(&wire) {
            Ok(request) => request,
            Err(err) => {
                debug!(index, error = %err, "Input packing failed");
                return Ok(Outcome::Failure(format!("failed to pack input: {err}")));
            }
        };

        guarded(&self.abort, self.channel.send(request)).await?;
        let reply = guarded(&self.abort, self.channel.receive()).await?;
        let response = validator::validate(&reply, self.validation)?;

        if !response.is_success() {
            let message = response.message().unwrap_or_default().to_owned();
            debug!(index, status = response.status(), %message, "Worker reported failure");
            return Ok(Outcome::Failure(message));
        }

        let data = response.into_data().unwrap_or(Value::Null);
        Ok(match decoder.decode(data) {
            Ok(payload) => Outcome::Success(payload),
            Err(err) => {
                debug!(index, error = %err, "Output decoding failed");
                Outcome::Failure(format!("failed to decode output: {err}"))
            }
        })
    }

    /// Closes the channel. Close failures are logged, never returned.
    pub async fn close(mut self) {
        let span = self.span.clone();
        let dispatch = self.dispatch.take();
        observed(dispatch, close_quietly(self.channel.as_mut()).instrument(span)).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("codecs", &self.codecs)
            .field("validation", &self.validation)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

/// Runs `fut` under `dispatch` when one was injected, otherwise under the
/// ambient subscriber.
pub(crate) async fn observed<F: Future>(dispatch: Option<Dispatch>, fut: F) -> F::Output {
    match dispatch {
        Some(dispatch) => fut.with_subscriber(dispatch).await,
        None => fut.await,
    }
}

async fn guarded<T>(
    abort: &CancellationToken,
    op: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, ClientError> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(ClientError::Aborted),
        result = op => result.map_err(ClientError::from),
    }
}
