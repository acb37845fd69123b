//! Service builder.
//!
//! [`RpcServiceBuilder`] collects the configuration and the method handlers
//! of one service and freezes them into an [`RpcService`]. The handler map
//! cannot change after [`build`](RpcServiceBuilder::build).
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use futures::stream;
//! use rsocket_rpc::{MessageLimits, Payload, RpcService, SimpleMeterRegistry};
//!
//! let registry = Arc::new(SimpleMeterRegistry::new());
//! let service = RpcService::builder("Echo")
//!     .meter_registry(registry.clone())
//!     .message_limits(MessageLimits::new().receive_max_bytes(64 * 1024))
//!     .unary("say", |data, _| async move { Ok(Payload::from_data(data)) })
//!     .stream("repeat", |data, _| {
//!         stream::iter([Ok(Payload::from_data(data.clone())), Ok(Payload::from_data(data))])
//!     })
//!     .build()
//!     .unwrap();
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use rsocket_rpc_core::{Payload, RpcError};

use crate::channel::Continuation;
use crate::handler::{Handler, HandlerMap};
use crate::layer::Decoration;
use crate::limits::MessageLimits;
use crate::marshaller::{IdentityMarshaller, Marshaller};
use crate::metrics::{MeterRegistry, NoopMeterRegistry};
use crate::service::RpcService;

/// Errors raised while assembling services.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("method {method} is registered twice in {service}")]
    DuplicateMethod { service: String, method: String },

    #[error("service {0} is registered twice")]
    DuplicateService(String),
}

/// Builder for [`RpcService`].
///
/// Defaults: identity marshaller, no-op meter registry, tracing enabled, no
/// message limits.
pub struct RpcServiceBuilder {
    name: String,
    handlers: Vec<(String, Handler)>,
    marshaller: Arc<dyn Marshaller>,
    registry: Arc<dyn MeterRegistry>,
    tracing: bool,
    limits: MessageLimits,
}

impl RpcServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
            marshaller: Arc::new(IdentityMarshaller),
            registry: Arc::new(NoopMeterRegistry),
            tracing: true,
            limits: MessageLimits::default(),
        }
    }

    /// Set the body marshaller.
    pub fn marshaller<M: Marshaller>(mut self, marshaller: M) -> Self {
        self.marshaller = Arc::new(marshaller);
        self
    }

    /// Set the registry receiving the server meters.
    pub fn meter_registry(mut self, registry: Arc<dyn MeterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Enable or disable the per-interaction `rsocket.rpc` span.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Set body size limits.
    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a handler for `method`.
    pub fn handler(mut self, method: impl Into<String>, handler: Handler) -> Self {
        self.handlers.push((method.into(), handler));
        self
    }

    /// Register a one-shot handler, serving request-response and
    /// fire-and-forget.
    pub fn unary<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Bytes, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, RpcError>> + Send + 'static,
    {
        self.handler(method, Handler::unary(f))
    }

    /// Register a stream handler, serving request-stream.
    pub fn stream<F, S>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Bytes, Bytes) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Payload, RpcError>> + Send + 'static,
    {
        self.handler(method, Handler::stream(f))
    }

    /// Register a channel handler, serving request-channel.
    pub fn channel<F, S>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Continuation, Bytes) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Payload, RpcError>> + Send + 'static,
    {
        self.handler(method, Handler::channel(f))
    }

    /// Freeze the configuration into a service.
    pub fn build(self) -> Result<RpcService, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::EmptyServiceName);
        }

        let mut handlers = HandlerMap::with_capacity(self.handlers.len());
        for (method, handler) in self.handlers {
            if handlers.contains_key(&method) {
                return Err(BuildError::DuplicateMethod {
                    service: self.name,
                    method,
                });
            }
            handlers.insert(method, handler);
        }

        Ok(RpcService::from_parts(
            self.name,
            handlers,
            self.marshaller,
            Decoration::new(self.registry, self.tracing),
            self.limits,
        ))
    }
}
