//! Interaction context and metadata routing.
//!
//! Every interaction is routed from its first inbound payload. The router
//! decodes the RPC metadata frame, resolves the method's handler and extracts
//! the caller's trace context. It is synchronous and has no side effects
//! beyond a debug log when the trace carrier cannot be read.

use std::sync::Arc;

use bytes::Bytes;
use rsocket_rpc_core::{Interaction, Payload, RpcError, RpcMetadata, SpanContext};

use crate::handler::{Handler, HandlerMap};

/// Per-interaction routing result, built once from the first message.
#[derive(Clone, Debug)]
pub struct InteractionContext {
    service: Arc<str>,
    method: String,
    span_context: Option<SpanContext>,
    interaction: Interaction,
}

impl InteractionContext {
    pub fn new(
        service: Arc<str>,
        method: impl Into<String>,
        span_context: Option<SpanContext>,
        interaction: Interaction,
    ) -> Self {
        Self {
            service,
            method: method.into(),
            span_context,
            interaction,
        }
    }

    /// The name of the service handling the interaction.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The caller's trace context, if one was propagated and readable.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_ref()
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }
}

/// A resolved interaction: its context and the handler to invoke.
#[derive(Clone, Debug)]
pub struct Route {
    pub context: InteractionContext,
    pub handler: Handler,
}

/// Route an interaction from its first payload.
///
/// # Errors
///
/// - [`RpcError::MissingMetadata`] if the payload carries no metadata
/// - [`RpcError::InvalidMetadata`] if the metadata frame cannot be decoded
/// - [`RpcError::UnknownMethod`] if no handler is registered for the method
pub fn route(
    first: &Payload,
    handlers: &HandlerMap,
    service: &Arc<str>,
    interaction: Interaction,
) -> Result<Route, RpcError> {
    let metadata = decode_metadata(first)?;
    let method = metadata.method();

    let handler = handlers
        .get(method)
        .cloned()
        .ok_or_else(|| RpcError::unknown_method(method, &**service))?;

    let span_context = read_span_context(metadata.tracing());

    Ok(Route {
        context: InteractionContext::new(service.clone(), method, span_context, interaction),
        handler,
    })
}

/// Decode the RPC metadata frame carried by `first`.
pub(crate) fn decode_metadata(first: &Payload) -> Result<RpcMetadata, RpcError> {
    match first.metadata() {
        Some(frame) if !frame.is_empty() => Ok(RpcMetadata::decode(frame)?),
        _ => Err(RpcError::MissingMetadata),
    }
}

fn read_span_context(tracing: &Bytes) -> Option<SpanContext> {
    match SpanContext::decode(tracing) {
        Ok(span_context) => span_context,
        Err(error) => {
            tracing::debug!(
                target: "rsocket_rpc",
                %error,
                "ignoring unreadable trace context"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsocket_rpc_core::MetadataError;

    fn handlers() -> HandlerMap {
        let mut handlers = HandlerMap::new();
        handlers.insert(
            "say".to_string(),
            Handler::unary(|data, _| async move { Ok(Payload::from_data(data)) }),
        );
        handlers
    }

    fn service() -> Arc<str> {
        Arc::from("Echo")
    }

    fn request(metadata: RpcMetadata) -> Payload {
        Payload::new(Some(Bytes::from_static(b"hi")), Some(metadata.encode().unwrap()))
    }

    #[test]
    fn test_route_resolves_method() {
        let route = route(
            &request(RpcMetadata::new("Echo", "say")),
            &handlers(),
            &service(),
            Interaction::RequestResponse,
        )
        .unwrap();

        assert_eq!(route.context.service(), "Echo");
        assert_eq!(route.context.method(), "say");
        assert_eq!(route.context.interaction(), Interaction::RequestResponse);
        assert!(route.context.span_context().is_none());
    }

    #[test]
    fn test_route_without_metadata() {
        let empty = Payload::new(Some(Bytes::from_static(b"hi")), Some(Bytes::new()));
        for payload in [Payload::from_data("hi"), empty] {
            let err = route(&payload, &handlers(), &service(), Interaction::RequestStream)
                .unwrap_err();
            assert_eq!(err, RpcError::MissingMetadata);
        }
    }

    #[test]
    fn test_route_unknown_method() {
        let err = route(
            &request(RpcMetadata::new("Echo", "shout")),
            &handlers(),
            &service(),
            Interaction::RequestResponse,
        )
        .unwrap_err();

        assert_eq!(err, RpcError::unknown_method("shout", "Echo"));
        assert_eq!(err.to_string(), "no method shout found in Echo handler");
    }

    #[test]
    fn test_route_invalid_frame() {
        let payload = Payload::new(None, Some(Bytes::from_static(&[0, 1, 0])));
        let err = route(&payload, &handlers(), &service(), Interaction::FireAndForget)
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::InvalidMetadata(MetadataError::Truncated { .. })
        ));
    }

    #[test]
    fn test_route_extracts_trace_context() {
        let carrier = SpanContext::new()
            .insert(
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .encode()
            .unwrap();
        let route = route(
            &request(RpcMetadata::new("Echo", "say").with_tracing(carrier)),
            &handlers(),
            &service(),
            Interaction::RequestResponse,
        )
        .unwrap();

        let span_context = route.context.span_context().unwrap();
        assert_eq!(
            span_context.trace_id().as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(
            span_context.parent_span_id().as_deref(),
            Some("00f067aa0ba902b7")
        );
    }

    #[test]
    fn test_unreadable_trace_context_degrades() {
        let route = route(
            &request(RpcMetadata::new("Echo", "say").with_tracing(Bytes::from_static(&[0, 9]))),
            &handlers(),
            &service(),
            Interaction::RequestResponse,
        )
        .unwrap();
        assert!(route.context.span_context().is_none());
    }
}
