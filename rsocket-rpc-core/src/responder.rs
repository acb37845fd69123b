//! The transport seam.
//!
//! An RSocket transport hands every inbound interaction to a [`Responder`].
//! One-shot results are lazy futures and multi-value results are boxed
//! streams: nothing runs until the transport polls, demand is expressed by
//! polling, and dropping a future or stream cancels the interaction.

use std::fmt;
use std::sync::Arc;

pub use futures::future::BoxFuture;
pub use futures::stream::BoxStream;

use crate::error::RpcError;
use crate::payload::Payload;

/// A one-shot producer resolving to exactly one payload or one error.
pub type PayloadFuture = BoxFuture<'static, Result<Payload, RpcError>>;

/// A stream producer emitting zero or more payloads, terminated by
/// completion or by a single error.
pub type PayloadStream = BoxStream<'static, Result<Payload, RpcError>>;

/// The interaction shapes an RSocket transport multiplexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interaction {
    FireAndForget,
    RequestResponse,
    RequestStream,
    RequestChannel,
    MetadataPush,
}

impl Interaction {
    /// Get the string representation of this interaction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interaction::FireAndForget => "fire_and_forget",
            Interaction::RequestResponse => "request_response",
            Interaction::RequestStream => "request_stream",
            Interaction::RequestChannel => "request_channel",
            Interaction::MetadataPush => "metadata_push",
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server side of an RSocket connection.
///
/// Transports call one method per inbound interaction. Implementations must
/// not block; all work happens when the returned future or stream is polled.
pub trait Responder: Send + Sync {
    /// Handle a fire-and-forget request. There is no response path: the
    /// returned future resolves once handling is finished, successful or not.
    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'static, ()>;

    /// Handle a request expecting exactly one response.
    fn request_response(&self, payload: Payload) -> PayloadFuture;

    /// Handle a request expecting a stream of responses.
    fn request_stream(&self, payload: Payload) -> PayloadStream;

    /// Handle a bidirectional channel. The first inbound payload opens it.
    fn request_channel(&self, payloads: PayloadStream) -> PayloadStream;

    /// Handle a metadata push.
    ///
    /// The default implementation rejects it.
    fn metadata_push(&self, payload: Payload) -> BoxFuture<'static, Result<(), RpcError>> {
        let _ = payload;
        Box::pin(futures::future::ready(Err(
            RpcError::UnsupportedCapability("metadata push"),
        )))
    }
}

impl<R> Responder for Arc<R>
where
    R: Responder + ?Sized,
{
    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'static, ()> {
        (**self).fire_and_forget(payload)
    }

    fn request_response(&self, payload: Payload) -> PayloadFuture {
        (**self).request_response(payload)
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        (**self).request_stream(payload)
    }

    fn request_channel(&self, payloads: PayloadStream) -> PayloadStream {
        (**self).request_channel(payloads)
    }

    fn metadata_push(&self, payload: Payload) -> BoxFuture<'static, Result<(), RpcError>> {
        (**self).metadata_push(payload)
    }
}
