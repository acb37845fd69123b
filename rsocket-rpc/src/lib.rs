//! # rsocket-rpc
//!
//! A reactive RPC dispatcher for [RSocket](https://rsocket.io) responders.
//!
//! An RSocket connection multiplexes four interaction shapes over a single
//! transport. This crate sits between the transport and user code: it routes
//! each interaction by the RPC metadata frame of its first payload, decorates
//! the invocation with a `tracing` span and server meters, runs the body
//! through a [`Marshaller`], and hands request-channel handlers the remainder
//! of the inbound stream as a single-subscriber [`Continuation`].
//!
//! The transport drives everything: futures and streams returned by the
//! dispatcher are lazy, demand is expressed by polling, and dropping a
//! producer cancels the interaction.
//!
//! ## Example
//!
//! ```rust
//! use futures::{StreamExt, TryStreamExt, stream};
//! use rsocket_rpc::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let echo = RpcService::builder("Echo")
//!     .unary("say", |data, _| async move { Ok(Payload::from_data(data)) })
//!     .channel("upper", |inbound, _| {
//!         inbound.map_ok(|body| Payload::from_data(body.to_ascii_uppercase()))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let metadata = RpcMetadata::new("Echo", "say").encode().unwrap();
//! let response = echo
//!     .request_response(Payload::new(Some("hi".into()), Some(metadata)))
//!     .await
//!     .unwrap();
//! assert_eq!(response.into_data(), "hi");
//!
//! let header = RpcMetadata::new("Echo", "upper").encode().unwrap();
//! let inbound = stream::iter([
//!     Ok(Payload::new(None, Some(header))),
//!     Ok(Payload::from_data("a")),
//! ]);
//! let replies: Vec<_> = echo.request_channel(inbound.boxed()).collect().await;
//! assert_eq!(replies, vec![Ok(Payload::from_data("A"))]);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`service`]: The per-service dispatcher
//! - [`request_handler`]: Routing across several services
//! - [`context`]: Metadata routing and the interaction context
//! - [`channel`]: Channel head-splitting
//! - [`layer`]: Tracing and metrics decoration
//! - [`metrics`]: The meter registry seam

pub mod channel;
pub mod context;
pub mod handler;
pub mod layer;
pub mod limits;
pub mod marshaller;
pub mod metrics;
pub mod request_handler;
pub mod service;
pub mod service_builder;

pub use rsocket_rpc_core::*;

pub use channel::{Continuation, Rest, SwitchOnFirst};
pub use context::{InteractionContext, Route, route};
pub use handler::{Cardinality, Handler, HandlerMap};
pub use layer::{Lifecycle, Observed, ObservedStream};
pub use limits::MessageLimits;
#[cfg(feature = "compression-gzip")]
pub use marshaller::GzipMarshaller;
pub use marshaller::{IdentityMarshaller, Marshaller};
pub use metrics::{MeterId, MeterRegistry, NoopMeterRegistry, SimpleMeterRegistry};
pub use request_handler::{RequestHandler, RequestHandlerBuilder};
pub use service::RpcService;
pub use service_builder::{BuildError, RpcServiceBuilder};

pub use bytes::{self, Bytes};
pub use futures;

pub mod prelude {
    //! The types needed to build and serve a service.
    pub use crate::channel::Continuation;
    pub use crate::marshaller::Marshaller;
    pub use crate::request_handler::RequestHandler;
    pub use crate::service::RpcService;
    pub use crate::service_builder::BuildError;
    pub use rsocket_rpc_core::{
        Payload, PayloadFuture, PayloadStream, Responder, RpcError, RpcMetadata, SpanContext,
    };
}
