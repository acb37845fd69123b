use rsocket_rpc_core::RpcError;
use tracing::Span;
use tracing::field::{Empty, display};

use super::Lifecycle;
use crate::context::InteractionContext;

/// Opens a `rsocket.rpc` span per interaction.
///
/// The span is created on subscription and entered on every poll of the
/// decorated producer. It closes on the terminal signal, or on drop with
/// `cancelled = true` when the requester cancels first.
pub(crate) struct TraceObserver {
    context: InteractionContext,
    span: Option<Span>,
}

impl TraceObserver {
    pub(crate) fn new(context: InteractionContext) -> Self {
        Self {
            context,
            span: None,
        }
    }

    fn close(&mut self, status: &'static str) {
        if let Some(span) = self.span.take() {
            span.record("otel.status_code", status);
        }
    }
}

impl Lifecycle for TraceObserver {
    fn on_subscribe(&mut self) {
        let context = &self.context;
        let span = tracing::info_span!(
            target: "rsocket_rpc",
            "rsocket.rpc",
            otel.name = context.service(),
            otel.kind = "server",
            otel.status_code = Empty,
            service = context.service(),
            role = "server",
            method = context.method(),
            interaction = %context.interaction(),
            trace_id = Empty,
            parent_span_id = Empty,
            error = Empty,
            cancelled = Empty,
        );

        if let Some(parent) = context.span_context() {
            if let Some(trace_id) = parent.trace_id() {
                span.record("trace_id", trace_id.as_str());
            }
            if let Some(parent_span_id) = parent.parent_span_id() {
                span.record("parent_span_id", parent_span_id.as_str());
            }
        }

        self.span = Some(span);
    }

    fn on_error(&mut self, error: &RpcError) {
        if let Some(span) = &self.span {
            span.record("error", display(error));
        }
        self.close("ERROR");
    }

    fn on_complete(&mut self) {
        self.close("OK");
    }

    fn in_scope<R>(&mut self, f: impl FnOnce() -> R) -> R {
        match &self.span {
            Some(span) => span.in_scope(f),
            None => f(),
        }
    }
}

impl Drop for TraceObserver {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            span.record("cancelled", true);
        }
    }
}
