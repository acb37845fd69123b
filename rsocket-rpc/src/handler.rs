//! Method handlers.
//!
//! A [`Handler`] is a type-erased method implementation registered on an
//! [`RpcServiceBuilder`](crate::RpcServiceBuilder). Handlers receive the
//! unmarshalled request body and the raw metadata frame of the first message.
//!
//! Three shapes exist:
//!
//! | Variant | Produces | Serves |
//! |---|---|---|
//! | [`Handler::Unary`] | one payload | request-response, fire-and-forget |
//! | [`Handler::Stream`] | a stream of payloads | request-stream |
//! | [`Handler::Channel`] | a stream of payloads | request-channel |
//!
//! Handler code runs behind a panic guard: a panic while invoking the handler
//! or while polling what it returned becomes
//! `RpcError::Application("handler panicked")`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt, future, stream};
use rsocket_rpc_core::{Interaction, Payload, PayloadFuture, PayloadStream, RpcError};

use crate::channel::Continuation;

/// Type-erased one-shot handler.
pub type UnaryFn = Arc<dyn Fn(Bytes, Bytes) -> PayloadFuture + Send + Sync>;

/// Type-erased stream handler.
pub type StreamFn = Arc<dyn Fn(Bytes, Bytes) -> PayloadStream + Send + Sync>;

/// Type-erased channel handler.
pub type ChannelFn = Arc<dyn Fn(Continuation, Bytes) -> PayloadStream + Send + Sync>;

/// Method name to handler.
pub type HandlerMap = HashMap<String, Handler>;

/// How many values a handler emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    OneShot,
    Stream,
}

/// A registered method implementation.
#[derive(Clone)]
pub enum Handler {
    Unary(UnaryFn),
    Stream(StreamFn),
    Channel(ChannelFn),
}

impl Handler {
    /// Wrap an async function answering with one payload.
    pub fn unary<F, Fut>(f: F) -> Self
    where
        F: Fn(Bytes, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, RpcError>> + Send + 'static,
    {
        Handler::Unary(Arc::new(move |data, metadata| f(data, metadata).boxed()))
    }

    /// Wrap a function answering with a stream of payloads.
    pub fn stream<F, S>(f: F) -> Self
    where
        F: Fn(Bytes, Bytes) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Payload, RpcError>> + Send + 'static,
    {
        Handler::Stream(Arc::new(move |data, metadata| f(data, metadata).boxed()))
    }

    /// Wrap a function consuming the channel's continuation and answering with
    /// a stream of payloads.
    pub fn channel<F, S>(f: F) -> Self
    where
        F: Fn(Continuation, Bytes) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Payload, RpcError>> + Send + 'static,
    {
        Handler::Channel(Arc::new(move |inbound, metadata| {
            f(inbound, metadata).boxed()
        }))
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Handler::Unary(_) => Cardinality::OneShot,
            Handler::Stream(_) | Handler::Channel(_) => Cardinality::Stream,
        }
    }

    /// The handler serving `interaction`, or `InteractionMismatch`.
    pub(crate) fn as_unary(
        &self,
        method: &str,
        interaction: Interaction,
    ) -> Result<&UnaryFn, RpcError> {
        match self {
            Handler::Unary(f) => Ok(f),
            _ => Err(mismatch(method, interaction)),
        }
    }

    pub(crate) fn as_stream(
        &self,
        method: &str,
        interaction: Interaction,
    ) -> Result<&StreamFn, RpcError> {
        match self {
            Handler::Stream(f) => Ok(f),
            _ => Err(mismatch(method, interaction)),
        }
    }

    pub(crate) fn as_channel(
        &self,
        method: &str,
        interaction: Interaction,
    ) -> Result<&ChannelFn, RpcError> {
        match self {
            Handler::Channel(f) => Ok(f),
            _ => Err(mismatch(method, interaction)),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Handler::Unary(_) => "Unary",
            Handler::Stream(_) => "Stream",
            Handler::Channel(_) => "Channel",
        };
        f.debug_tuple("Handler").field(&name).finish()
    }
}

fn mismatch(method: &str, interaction: Interaction) -> RpcError {
    RpcError::InteractionMismatch {
        method: method.to_string(),
        interaction,
    }
}

fn panicked() -> RpcError {
    tracing::error!(target: "rsocket_rpc", "handler panicked");
    RpcError::application("handler panicked")
}

pub(crate) fn call_unary(f: &UnaryFn, data: Bytes, metadata: Bytes) -> PayloadFuture {
    match panic::catch_unwind(AssertUnwindSafe(|| f(data, metadata))) {
        Ok(response) => AssertUnwindSafe(response)
            .catch_unwind()
            .map(|result| result.unwrap_or_else(|_| Err(panicked())))
            .boxed(),
        Err(_) => future::ready(Err(panicked())).boxed(),
    }
}

pub(crate) fn call_stream(f: &StreamFn, data: Bytes, metadata: Bytes) -> PayloadStream {
    match panic::catch_unwind(AssertUnwindSafe(|| f(data, metadata))) {
        Ok(responses) => guard_stream(responses),
        Err(_) => stream::once(future::ready(Err(panicked()))).boxed(),
    }
}

pub(crate) fn call_channel(
    f: &ChannelFn,
    inbound: Continuation,
    metadata: Bytes,
) -> PayloadStream {
    match panic::catch_unwind(AssertUnwindSafe(|| f(inbound, metadata))) {
        Ok(responses) => guard_stream(responses),
        Err(_) => stream::once(future::ready(Err(panicked()))).boxed(),
    }
}

fn guard_stream(responses: PayloadStream) -> PayloadStream {
    AssertUnwindSafe(responses)
        .catch_unwind()
        .map(|item| item.unwrap_or_else(|_| Err(panicked())))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_unary_handler_receives_body_and_metadata() {
        let handler = Handler::unary(|data: Bytes, metadata: Bytes| async move {
            assert_eq!(&metadata[..], b"frame");
            Ok(Payload::from_data(data))
        });
        assert_eq!(handler.cardinality(), Cardinality::OneShot);

        let f = handler
            .as_unary("say", Interaction::RequestResponse)
            .unwrap();
        let response = call_unary(f, Bytes::from_static(b"hi"), Bytes::from_static(b"frame"))
            .await
            .unwrap();
        assert_eq!(response.data().unwrap(), &Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_stream_handler() {
        let handler = Handler::stream(|data: Bytes, _| {
            stream::iter(vec![
                Ok(Payload::from_data(data.clone())),
                Ok(Payload::from_data(data)),
            ])
        });
        assert_eq!(handler.cardinality(), Cardinality::Stream);

        let f = handler.as_stream("twice", Interaction::RequestStream).unwrap();
        let items: Vec<_> = call_stream(f, Bytes::from_static(b"x"), Bytes::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_wrong_shape_is_a_mismatch() {
        let handler = Handler::unary(|_, _| async { Ok(Payload::default()) });
        let Err(err) = handler.as_stream("say", Interaction::RequestStream) else {
            panic!("a unary handler must not serve request-stream");
        };
        assert_eq!(
            err,
            RpcError::InteractionMismatch {
                method: "say".to_string(),
                interaction: Interaction::RequestStream,
            }
        );
        assert!(handler.as_channel("say", Interaction::RequestChannel).is_err());
    }

    #[tokio::test]
    async fn test_panic_on_invoke_is_caught() {
        let handler = Handler::unary(|_, _| -> future::Ready<Result<Payload, RpcError>> {
            panic!("boom")
        });
        let f = handler.as_unary("boom", Interaction::RequestResponse).unwrap();

        let err = call_unary(f, Bytes::new(), Bytes::new()).await.unwrap_err();
        assert_eq!(err, RpcError::application("handler panicked"));
    }

    #[tokio::test]
    async fn test_panic_while_polling_ends_stream() {
        let handler = Handler::stream(|_, _| {
            stream::iter(0..3).map(|i| {
                if i == 1 {
                    panic!("boom");
                }
                Ok(Payload::default())
            })
        });
        let f = handler.as_stream("boom", Interaction::RequestStream).unwrap();

        let items: Vec<_> = call_stream(f, Bytes::new(), Bytes::new()).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(RpcError::application("handler panicked")));
    }

    #[test]
    fn test_debug_names_variant() {
        let handler = Handler::unary(|_, _| async { Ok(Payload::default()) });
        assert_eq!(format!("{handler:?}"), "Handler(\"Unary\")");
    }
}
