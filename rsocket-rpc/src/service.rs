//! The interaction dispatcher.
//!
//! [`RpcService`] adapts the four RSocket interaction shapes onto the
//! handlers of one service:
//!
//! | Interaction | Handler | Result |
//! |---|---|---|
//! | fire-and-forget | `Unary` | settles once handling is done, errors are logged |
//! | request-response | `Unary` | one payload or one error |
//! | request-stream | `Stream` | the handler's stream, ended by its first error |
//! | request-channel | `Channel` | routed by the first inbound payload |
//! | metadata-push | none | `UnsupportedCapability` |
//!
//! Routing happens synchronously when the transport hands the interaction
//! over. Everything else (unmarshalling, handler invocation, marshalling)
//! happens while the returned producer is polled, inside its decoration.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt, TryFutureExt, future, stream};
use rsocket_rpc_core::{
    BoxFuture, Interaction, Payload, PayloadFuture, PayloadStream, Responder, RpcError,
};

use crate::channel::{Continuation, Rest, SwitchOnFirst};
use crate::context::{self, InteractionContext, Route};
use crate::handler::{self, Handler, HandlerMap};
use crate::layer::Decoration;
use crate::limits::MessageLimits;
use crate::marshaller::Marshaller;
use crate::service_builder::RpcServiceBuilder;

/// A routable service: a name and its method handlers.
///
/// Cloning is cheap; clones share the same handler map.
///
/// # Example
///
/// ```rust
/// use rsocket_rpc::{Payload, RpcService};
///
/// let service = RpcService::builder("Echo")
///     .unary("say", |data, _metadata| async move { Ok(Payload::from_data(data)) })
///     .build()
///     .unwrap();
/// assert_eq!(service.name(), "Echo");
/// ```
#[derive(Clone)]
pub struct RpcService {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    handlers: HandlerMap,
    marshaller: Arc<dyn Marshaller>,
    decoration: Decoration,
    limits: MessageLimits,
}

impl RpcService {
    /// Start building a service named `name`.
    pub fn builder(name: impl Into<String>) -> RpcServiceBuilder {
        RpcServiceBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        handlers: HandlerMap,
        marshaller: Arc<dyn Marshaller>,
        decoration: Decoration,
        limits: MessageLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(name),
                handlers,
                marshaller,
                decoration,
                limits,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The registered method names, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.inner.handlers.keys().map(String::as_str)
    }

    pub(crate) fn open_channel(
        &self,
        first: Payload,
        rest: Rest<PayloadStream>,
    ) -> Result<PayloadStream, RpcError> {
        self.inner.dispatch_channel(first, rest)
    }
}

impl fmt::Debug for RpcService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods().collect();
        methods.sort_unstable();
        f.debug_struct("RpcService")
            .field("name", &self.name())
            .field("methods", &methods)
            .finish()
    }
}

impl Responder for RpcService {
    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'static, ()> {
        // Rejections are logged while resolving.
        let Ok(response) = self.inner.route_unary(payload, Interaction::FireAndForget) else {
            return future::ready(()).boxed();
        };
        let service = self.inner.name.clone();

        async move {
            if let Err(error) = response.await {
                tracing::warn!(
                    target: "rsocket_rpc",
                    service = %service,
                    %error,
                    "fire-and-forget request failed"
                );
            }
        }
        .boxed()
    }

    fn request_response(&self, payload: Payload) -> PayloadFuture {
        self.inner.dispatch_unary(payload, Interaction::RequestResponse)
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        self.inner.dispatch_stream(payload)
    }

    fn request_channel(&self, payloads: PayloadStream) -> PayloadStream {
        let service = self.clone();
        SwitchOnFirst::new(payloads, move |first, rest| service.open_channel(first, rest)).boxed()
    }
}

type Select<T> = for<'a> fn(&'a Handler, &str, Interaction) -> Result<&'a T, RpcError>;

impl Inner {
    /// Route `first` and pick the handler shape `interaction` needs.
    fn resolve<T: Clone>(
        &self,
        first: &Payload,
        interaction: Interaction,
        select: Select<T>,
    ) -> Result<(InteractionContext, T), RpcError> {
        let resolved = context::route(first, &self.handlers, &self.name, interaction).and_then(
            |Route { context, handler }| {
                let f = select(&handler, context.method(), interaction)?.clone();
                Ok((context, f))
            },
        );

        if let Err(error) = &resolved {
            tracing::warn!(
                target: "rsocket_rpc",
                service = %self.name,
                %interaction,
                %error,
                "rejected interaction"
            );
        }
        resolved
    }

    fn decode_request(&self, payload: Payload) -> Result<(Bytes, Bytes), RpcError> {
        self.limits.check_receive(payload.data_len())?;
        Ok(self.marshaller.unmarshall(payload)?.into_parts())
    }

    fn decode_body(&self, payload: Payload) -> Result<Bytes, RpcError> {
        self.limits.check_receive(payload.data_len())?;
        Ok(self.marshaller.unmarshall(payload)?.into_data())
    }

    fn encode_response(&self, payload: Payload) -> Result<Payload, RpcError> {
        let payload = self.marshaller.marshall(payload)?;
        self.limits.check_send(payload.data_len())?;
        Ok(payload)
    }

    fn dispatch_unary(
        self: &Arc<Self>,
        payload: Payload,
        interaction: Interaction,
    ) -> PayloadFuture {
        self.route_unary(payload, interaction)
            .unwrap_or_else(|error| future::ready(Err(error)).boxed())
    }

    fn route_unary(
        self: &Arc<Self>,
        payload: Payload,
        interaction: Interaction,
    ) -> Result<PayloadFuture, RpcError> {
        let (context, f) = self.resolve(&payload, interaction, Handler::as_unary)?;

        let inner = self.clone();
        let response = async move {
            let (data, metadata) = inner.decode_request(payload)?;
            let response = handler::call_unary(&f, data, metadata).await?;
            inner.encode_response(response)
        };
        Ok(self.decoration.single(&context, response.boxed()))
    }

    fn dispatch_stream(self: &Arc<Self>, payload: Payload) -> PayloadStream {
        let interaction = Interaction::RequestStream;
        let (context, f) = match self.resolve(&payload, interaction, Handler::as_stream) {
            Ok(resolved) => resolved,
            Err(error) => return stream::once(future::ready(Err(error))).boxed(),
        };

        let inner = self.clone();
        let responses = future::lazy(move |_| -> Result<PayloadStream, RpcError> {
            let (data, metadata) = inner.decode_request(payload)?;
            let encoder = inner.clone();
            Ok(handler::call_stream(&f, data, metadata)
                .map(move |item| item.and_then(|response| encoder.encode_response(response)))
                .boxed())
        })
        .try_flatten_stream();

        self.decoration.stream(&context, terminate_on_error(responses))
    }

    fn dispatch_channel(
        self: &Arc<Self>,
        first: Payload,
        rest: Rest<PayloadStream>,
    ) -> Result<PayloadStream, RpcError> {
        let (context, f) = self.resolve(&first, Interaction::RequestChannel, Handler::as_channel)?;
        let metadata = first.metadata().cloned().unwrap_or_default();

        let decoder = self.clone();
        let inbound = Continuation::new(
            rest.map(move |item| item.and_then(|payload| decoder.decode_body(payload))),
        );

        let encoder = self.clone();
        let responses = future::lazy(move |_| handler::call_channel(&f, inbound, metadata))
            .flatten_stream()
            .map(move |item| item.and_then(|response| encoder.encode_response(response)));

        Ok(self.decoration.stream(&context, terminate_on_error(responses)))
    }
}

/// End `responses` after the first error.
fn terminate_on_error<S>(responses: S) -> PayloadStream
where
    S: Stream<Item = Result<Payload, RpcError>> + Send + 'static,
{
    responses
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}
