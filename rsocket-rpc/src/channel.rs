//! Channel head-splitting.
//!
//! A request-channel is routed by its first inbound payload, but the handler
//! only learns about the payloads that follow. [`SwitchOnFirst`] waits for
//! the first payload, hands it together with the remainder of the inbound
//! stream ([`Rest`]) to a transform, and then forwards whatever the transform
//! produced.
//!
//! ```text
//! AwaitingHeader --first--> Routing --Ok--> Streaming --end--> Terminal
//!        |                     |
//!        +--error/empty--------+--Err-----------------------> Terminal
//! ```
//!
//! The handler side of the split is a [`Continuation`]: a stream of bodies
//! that can be subscribed to exactly once.

use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use rsocket_rpc_core::{Payload, PayloadStream, RpcError};

/// Splits an inbound channel into its first payload and the rest.
///
/// The transform runs once, during the poll that observes the first payload.
/// If the inbound stream completes before producing a payload the output is
/// a single [`RpcError::EmptyChannel`]; if it fails first, that error.
pub struct SwitchOnFirst<S, F> {
    state: State<S, F>,
}

enum State<S, F> {
    AwaitingHeader { inbound: S, transform: F },
    Routing,
    Streaming(PayloadStream),
    Terminal,
}

impl<S, F> SwitchOnFirst<S, F>
where
    F: FnOnce(Payload, Rest<S>) -> Result<PayloadStream, RpcError>,
{
    pub fn new(inbound: S, transform: F) -> Self {
        Self {
            state: State::AwaitingHeader { inbound, transform },
        }
    }
}

// `F` is moved out, never pinned.
impl<S, F> Unpin for SwitchOnFirst<S, F> where S: Unpin {}

impl<S, F> Stream for SwitchOnFirst<S, F>
where
    S: Stream<Item = Result<Payload, RpcError>> + Unpin,
    F: FnOnce(Payload, Rest<S>) -> Result<PayloadStream, RpcError>,
{
    type Item = Result<Payload, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match mem::replace(&mut this.state, State::Routing) {
                State::AwaitingHeader {
                    mut inbound,
                    transform,
                } => match Pin::new(&mut inbound).poll_next(cx) {
                    Poll::Pending => {
                        this.state = State::AwaitingHeader { inbound, transform };
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(Ok(first))) => match transform(first, Rest::new(inbound)) {
                        Ok(outbound) => this.state = State::Streaming(outbound),
                        Err(error) => {
                            this.state = State::Terminal;
                            return Poll::Ready(Some(Err(error)));
                        }
                    },
                    Poll::Ready(Some(Err(error))) => {
                        this.state = State::Terminal;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Ready(None) => {
                        this.state = State::Terminal;
                        return Poll::Ready(Some(Err(RpcError::EmptyChannel)));
                    }
                },
                State::Streaming(mut outbound) => {
                    return match outbound.poll_next_unpin(cx) {
                        Poll::Ready(None) => {
                            this.state = State::Terminal;
                            Poll::Ready(None)
                        }
                        poll => {
                            this.state = State::Streaming(outbound);
                            poll
                        }
                    };
                }
                // Routing is only observable after the transform panicked.
                State::Routing | State::Terminal => {
                    this.state = State::Terminal;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<S, F> fmt::Debug for SwitchOnFirst<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::AwaitingHeader { .. } => "AwaitingHeader",
            State::Routing => "Routing",
            State::Streaming(_) => "Streaming",
            State::Terminal => "Terminal",
        };
        f.debug_struct("SwitchOnFirst").field("state", &state).finish()
    }
}

/// The inbound stream after its first payload.
///
/// Polling it polls the inbound stream; dropping it cancels the inbound
/// stream. It ends after yielding an error.
#[derive(Debug)]
pub struct Rest<S> {
    inbound: S,
    done: bool,
}

impl<S> Rest<S> {
    fn new(inbound: S) -> Self {
        Self {
            inbound,
            done: false,
        }
    }
}

impl<S, T> Stream for Rest<S>
where
    S: Stream<Item = Result<T, RpcError>> + Unpin,
{
    type Item = Result<T, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let item = ready!(Pin::new(&mut this.inbound).poll_next(cx));
        if !matches!(item, Some(Ok(_))) {
            this.done = true;
        }
        Poll::Ready(item)
    }
}

type Body = BoxStream<'static, Result<Bytes, RpcError>>;

/// The inbound bodies of a channel, as seen by its handler.
///
/// Handles can be cloned freely, but the underlying stream has a single
/// subscriber: the first handle to be polled takes it, any other handle
/// yields [`RpcError::MultipleSubscription`] once and ends.
pub struct Continuation {
    slot: Arc<Mutex<Option<Body>>>,
    subscription: Subscription,
}

enum Subscription {
    Pending,
    Active(Body),
    Done,
}

impl Continuation {
    pub fn new<S>(bodies: S) -> Self
    where
        S: Stream<Item = Result<Bytes, RpcError>> + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(bodies.boxed()))),
            subscription: Subscription::Pending,
        }
    }
}

fn take_body(slot: &Mutex<Option<Body>>) -> Option<Body> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl Clone for Continuation {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            subscription: Subscription::Pending,
        }
    }
}

impl Stream for Continuation {
    type Item = Result<Bytes, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.subscription {
                Subscription::Pending => match take_body(&this.slot) {
                    Some(bodies) => this.subscription = Subscription::Active(bodies),
                    None => {
                        this.subscription = Subscription::Done;
                        return Poll::Ready(Some(Err(RpcError::MultipleSubscription)));
                    }
                },
                Subscription::Active(bodies) => {
                    let item = ready!(bodies.poll_next_unpin(cx));
                    if item.is_none() {
                        this.subscription = Subscription::Done;
                    }
                    return Poll::Ready(item);
                }
                Subscription::Done => return Poll::Ready(None),
            }
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscription = match self.subscription {
            Subscription::Pending => "Pending",
            Subscription::Active(_) => "Active",
            Subscription::Done => "Done",
        };
        f.debug_struct("Continuation")
            .field("subscription", &subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{TryStreamExt, stream};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn inbound(items: Vec<Result<Payload, RpcError>>) -> PayloadStream {
        stream::iter(items).boxed()
    }

    fn data(payload: &Payload) -> &[u8] {
        payload.data().map(|d| &d[..]).unwrap_or_default()
    }

    fn echo_rest(first: Payload, rest: Rest<PayloadStream>) -> Result<PayloadStream, RpcError> {
        assert_eq!(data(&first), b"header");
        Ok(rest.boxed())
    }

    #[tokio::test]
    async fn test_header_is_excluded_from_rest() {
        let split = SwitchOnFirst::new(
            inbound(vec![
                Ok(Payload::from_data("header")),
                Ok(Payload::from_data("a")),
                Ok(Payload::from_data("b")),
            ]),
            echo_rest,
        );

        let items: Vec<_> = split.try_collect().await.unwrap();
        let bodies: Vec<_> = items.iter().map(data).collect();
        assert_eq!(bodies, vec![&b"a"[..], &b"b"[..]]);
    }

    #[tokio::test]
    async fn test_single_value_channel_has_empty_rest() {
        let split = SwitchOnFirst::new(inbound(vec![Ok(Payload::from_data("header"))]), echo_rest);
        let items: Vec<_> = split.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_empty_inbound() {
        let invoked = AtomicBool::new(false);
        let split = SwitchOnFirst::new(inbound(vec![]), |_first, rest| {
            invoked.store(true, Ordering::SeqCst);
            Ok(rest.boxed())
        });

        let items: Vec<_> = split.collect().await;
        assert_eq!(items, vec![Err(RpcError::EmptyChannel)]);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_inbound_error_before_header() {
        let split = SwitchOnFirst::new(
            inbound(vec![Err(RpcError::application("gone"))]),
            echo_rest,
        );
        let items: Vec<_> = split.collect().await;
        assert_eq!(items, vec![Err(RpcError::application("gone"))]);
    }

    #[tokio::test]
    async fn test_transform_error_ends_channel() {
        let split = SwitchOnFirst::new(
            inbound(vec![Ok(Payload::from_data("header")), Ok(Payload::from_data("a"))]),
            |_first, _rest| Err(RpcError::MissingMetadata),
        );
        let items: Vec<_> = split.collect().await;
        assert_eq!(items, vec![Err(RpcError::MissingMetadata)]);
    }

    #[tokio::test]
    async fn test_rest_ends_after_error() {
        let split = SwitchOnFirst::new(
            inbound(vec![
                Ok(Payload::from_data("header")),
                Err(RpcError::application("broken")),
                Ok(Payload::from_data("late")),
            ]),
            echo_rest,
        );
        let items: Vec<_> = split.collect().await;
        assert_eq!(items, vec![Err(RpcError::application("broken"))]);
    }

    #[tokio::test]
    async fn test_continuation_single_subscriber() {
        let first = Continuation::new(stream::iter(vec![Ok(Bytes::from_static(b"x"))]));
        let second = first.clone();

        let taken: Vec<_> = first.collect().await;
        assert_eq!(taken, vec![Ok(Bytes::from_static(b"x"))]);

        let rejected: Vec<_> = second.collect().await;
        assert_eq!(rejected, vec![Err(RpcError::MultipleSubscription)]);
    }

    #[tokio::test]
    async fn test_dropping_continuation_cancels_inbound() {
        struct Probe(Arc<AtomicBool>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let probe = Probe(cancelled.clone());
        let bodies = stream::iter(vec![Ok(Bytes::from_static(b"x"))]).map(move |item| {
            let _ = &probe;
            item
        });

        let mut continuation = Continuation::new(bodies);
        let copy = continuation.clone();
        assert!(continuation.next().await.is_some());
        assert!(!cancelled.load(Ordering::SeqCst));

        drop(continuation);
        drop(copy);
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
