use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;
use pin_project_lite::pin_project;
use rsocket_rpc_core::RpcError;

/// Signals observed on a decorated producer.
///
/// Hooks are invoked from `poll`, in order: `on_subscribe` once on the first
/// poll, `on_next` per value, then at most one of `on_error` or
/// `on_complete`. Cancellation is the observer being dropped without a
/// terminal hook, so implementations release their resources in `Drop`.
pub trait Lifecycle: Send {
    fn on_subscribe(&mut self) {}

    fn on_next(&mut self) {}

    fn on_error(&mut self, error: &RpcError) {
        let _ = error;
    }

    fn on_complete(&mut self) {}

    /// Run `f`, which polls the decorated producer, inside the observer's
    /// scope.
    fn in_scope<R>(&mut self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

pin_project! {
    /// A one-shot producer driving a [`Lifecycle`].
    pub struct Observed<F, L> {
        #[pin]
        inner: F,
        observer: L,
        subscribed: bool,
    }
}

impl<F, L> Observed<F, L> {
    pub fn new(inner: F, observer: L) -> Self {
        Self {
            inner,
            observer,
            subscribed: false,
        }
    }
}

impl<F, L, T> Future for Observed<F, L>
where
    F: Future<Output = Result<T, RpcError>>,
    L: Lifecycle,
{
    type Output = Result<T, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if !*this.subscribed {
            *this.subscribed = true;
            this.observer.on_subscribe();
        }

        let mut inner = this.inner;
        let output = ready!(this.observer.in_scope(|| inner.as_mut().poll(cx)));
        match &output {
            Ok(_) => {
                this.observer.on_next();
                this.observer.on_complete();
            }
            Err(error) => this.observer.on_error(error),
        }
        Poll::Ready(output)
    }
}

pin_project! {
    /// A stream producer driving a [`Lifecycle`].
    pub struct ObservedStream<S, L> {
        #[pin]
        inner: S,
        observer: L,
        subscribed: bool,
    }
}

impl<S, L> ObservedStream<S, L> {
    pub fn new(inner: S, observer: L) -> Self {
        Self {
            inner,
            observer,
            subscribed: false,
        }
    }
}

impl<S, L, T> Stream for ObservedStream<S, L>
where
    S: Stream<Item = Result<T, RpcError>>,
    L: Lifecycle,
{
    type Item = Result<T, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if !*this.subscribed {
            *this.subscribed = true;
            this.observer.on_subscribe();
        }

        let mut inner = this.inner;
        let item = ready!(this.observer.in_scope(|| inner.as_mut().poll_next(cx)));
        match &item {
            Some(Ok(_)) => this.observer.on_next(),
            Some(Err(error)) => this.observer.on_error(error),
            None => this.observer.on_complete(),
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt, future, stream};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl Recorder {
        fn events(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, event: &'static str) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Lifecycle for Recorder {
        fn on_subscribe(&mut self) {
            self.push("subscribe");
        }

        fn on_next(&mut self) {
            self.push("next");
        }

        fn on_error(&mut self, _error: &RpcError) {
            self.push("error");
        }

        fn on_complete(&mut self) {
            self.push("complete");
        }
    }

    #[tokio::test]
    async fn test_future_success() {
        let recorder = Recorder::default();
        let value = Observed::new(future::ready(Ok::<_, RpcError>(7)), recorder.clone()).await;
        assert_eq!(value, Ok(7));
        assert_eq!(recorder.events(), vec!["subscribe", "next", "complete"]);
    }

    #[tokio::test]
    async fn test_future_error() {
        let recorder = Recorder::default();
        let value = Observed::new(
            future::ready(Err::<(), _>(RpcError::application("no"))),
            recorder.clone(),
        )
        .await;
        assert!(value.is_err());
        assert_eq!(recorder.events(), vec!["subscribe", "error"]);
    }

    #[test]
    fn test_unpolled_future_observes_nothing() {
        let recorder = Recorder::default();
        drop(Observed::new(future::pending::<Result<(), RpcError>>(), recorder.clone()));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_pending_future_subscribes_once() {
        let recorder = Recorder::default();
        let mut observed = Observed::new(future::pending::<Result<(), RpcError>>(), recorder.clone());
        assert!((&mut observed).now_or_never().is_none());
        assert!((&mut observed).now_or_never().is_none());
        assert_eq!(recorder.events(), vec!["subscribe"]);
    }

    #[tokio::test]
    async fn test_stream_signals() {
        let recorder = Recorder::default();
        let items: Vec<_> = ObservedStream::new(
            stream::iter(vec![Ok::<_, RpcError>(1), Ok(2)]),
            recorder.clone(),
        )
        .collect()
        .await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            recorder.events(),
            vec!["subscribe", "next", "next", "complete"]
        );
    }
}
