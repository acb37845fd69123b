//! Interaction decoration.
//!
//! Every routed interaction is wrapped in two decorators before it reaches
//! the transport:
//!
//! ```text
//! metrics( tracing( unmarshall -> handler -> marshall ) )
//! ```
//!
//! Each decorator is a [`Lifecycle`] observer, written once and applied to
//! either cardinality through [`Observed`] (one-shot) or [`ObservedStream`]
//! (stream). Decoration never changes the values, their order or count, and
//! polls the inner producer only when it is polled itself.

mod lifecycle;
mod metrics;
mod trace;

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use rsocket_rpc_core::{PayloadFuture, PayloadStream};

pub use lifecycle::{Lifecycle, Observed, ObservedStream};

use self::metrics::MetricsObserver;
use self::trace::TraceObserver;
use crate::context::InteractionContext;
use crate::metrics::MeterRegistry;

/// The decorators configured for a service.
#[derive(Clone)]
pub(crate) struct Decoration {
    registry: Arc<dyn MeterRegistry>,
    tracing: bool,
}

impl Decoration {
    pub(crate) fn new(registry: Arc<dyn MeterRegistry>, tracing: bool) -> Self {
        Self { registry, tracing }
    }

    pub(crate) fn single(
        &self,
        context: &InteractionContext,
        inner: PayloadFuture,
    ) -> PayloadFuture {
        let traced = if self.tracing {
            Observed::new(inner, TraceObserver::new(context.clone())).boxed()
        } else {
            inner
        };
        let metrics = MetricsObserver::new(self.registry.clone(), context.clone());
        Observed::new(traced, metrics).boxed()
    }

    pub(crate) fn stream(
        &self,
        context: &InteractionContext,
        inner: PayloadStream,
    ) -> PayloadStream {
        let traced = if self.tracing {
            ObservedStream::new(inner, TraceObserver::new(context.clone())).boxed()
        } else {
            inner
        };
        let metrics = MetricsObserver::new(self.registry.clone(), context.clone());
        ObservedStream::new(traced, metrics).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        CANCELLATIONS, DURATION, ERRORS, INVOCATIONS, ITEMS, MeterId, SimpleMeterRegistry,
    };
    use futures::{TryStreamExt, future, stream};
    use rsocket_rpc_core::{Interaction, Payload, RpcError};

    fn context() -> InteractionContext {
        InteractionContext::new(Arc::from("Echo"), "say", None, Interaction::RequestStream)
    }

    fn decoration() -> (Arc<SimpleMeterRegistry>, Decoration) {
        let registry = Arc::new(SimpleMeterRegistry::new());
        (registry.clone(), Decoration::new(registry, true))
    }

    fn id(name: &'static str) -> MeterId {
        MeterId::server(name, "Echo", "say")
    }

    #[tokio::test]
    async fn test_single_success_is_metered() {
        let (registry, decoration) = decoration();
        let response = decoration
            .single(&context(), future::ready(Ok(Payload::from_data("hi"))).boxed())
            .await;

        assert!(response.is_ok());
        assert_eq!(registry.counter(&id(INVOCATIONS)), 1);
        assert_eq!(registry.counter(&id(ERRORS)), 0);
        assert_eq!(registry.counter(&id(ITEMS)), 1);
        assert_eq!(registry.timer_count(&id(DURATION)), 1);
    }

    #[tokio::test]
    async fn test_single_error_is_metered() {
        let (registry, decoration) = decoration();
        let response = decoration
            .single(&context(), future::ready(Err(RpcError::application("no"))).boxed())
            .await;

        assert!(response.is_err());
        assert_eq!(registry.counter(&id(ERRORS)), 1);
        assert_eq!(registry.counter(&id(CANCELLATIONS)), 0);
        assert_eq!(registry.timer_count(&id(DURATION)), 1);
    }

    #[tokio::test]
    async fn test_stream_values_pass_through() {
        let (registry, decoration) = decoration();
        let values = vec![
            Ok(Payload::from_data("a")),
            Ok(Payload::from_data("b")),
            Ok(Payload::from_data("c")),
        ];
        let items: Vec<_> = decoration
            .stream(&context(), stream::iter(values.clone()).boxed())
            .try_collect()
            .await
            .unwrap();

        let expected: Vec<_> = values.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, expected);
        assert_eq!(registry.counter(&id(ITEMS)), 3);
        assert_eq!(registry.timer_count(&id(DURATION)), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stream_is_metered_once() {
        let (registry, decoration) = decoration();
        let mut decorated = decoration.stream(
            &context(),
            stream::iter(vec![Ok(Payload::from_data("a"))])
                .chain(stream::pending())
                .boxed(),
        );

        assert!(decorated.next().await.is_some());
        drop(decorated);

        assert_eq!(registry.counter(&id(INVOCATIONS)), 1);
        assert_eq!(registry.counter(&id(CANCELLATIONS)), 1);
        assert_eq!(registry.counter(&id(ERRORS)), 0);
        assert_eq!(registry.counter(&id(ITEMS)), 1);
        assert_eq!(registry.timer_count(&id(DURATION)), 1);
    }

    #[test]
    fn test_unsubscribed_producer_records_nothing() {
        let (registry, decoration) = decoration();
        drop(decoration.single(&context(), future::ready(Ok(Payload::default())).boxed()));
        assert!(registry.snapshot().is_empty());
    }
}
