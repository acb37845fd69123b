//! Multi-service routing.
//!
//! A connection usually serves more than one service. [`RequestHandler`]
//! reads the `service` field of the first payload's metadata frame and
//! forwards the interaction to the matching [`RpcService`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::{FutureExt, StreamExt, future, stream};
use rsocket_rpc_core::{
    BoxFuture, Interaction, Payload, PayloadFuture, PayloadStream, Responder, RpcError,
};

use crate::channel::SwitchOnFirst;
use crate::context::decode_metadata;
use crate::service::RpcService;
use crate::service_builder::BuildError;

/// A [`Responder`] dispatching to several services by name.
///
/// # Example
///
/// ```rust
/// use rsocket_rpc::{Payload, RequestHandler, RpcService};
///
/// let echo = RpcService::builder("Echo")
///     .unary("say", |data, _| async move { Ok(Payload::from_data(data)) })
///     .build()
///     .unwrap();
/// let ping = RpcService::builder("Ping")
///     .unary("ping", |_, _| async { Ok(Payload::from_data("pong")) })
///     .build()
///     .unwrap();
///
/// let handler = RequestHandler::builder()
///     .add_service(echo)
///     .add_service(ping)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct RequestHandler {
    services: Arc<HashMap<String, RpcService>>,
}

impl RequestHandler {
    pub fn builder() -> RequestHandlerBuilder {
        RequestHandlerBuilder::new()
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&RpcService> {
        self.services.get(name)
    }

    fn resolve(&self, first: &Payload, interaction: Interaction) -> Result<RpcService, RpcError> {
        let resolved = decode_metadata(first).and_then(|metadata| {
            self.services
                .get(metadata.service())
                .cloned()
                .ok_or_else(|| RpcError::UnknownService(metadata.service().to_string()))
        });

        if let Err(error) = &resolved {
            tracing::warn!(
                target: "rsocket_rpc",
                %interaction,
                %error,
                "rejected interaction"
            );
        }
        resolved
    }
}

impl Responder for RequestHandler {
    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'static, ()> {
        match self.resolve(&payload, Interaction::FireAndForget) {
            Ok(service) => service.fire_and_forget(payload),
            Err(_) => future::ready(()).boxed(),
        }
    }

    fn request_response(&self, payload: Payload) -> PayloadFuture {
        match self.resolve(&payload, Interaction::RequestResponse) {
            Ok(service) => service.request_response(payload),
            Err(error) => future::ready(Err(error)).boxed(),
        }
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        match self.resolve(&payload, Interaction::RequestStream) {
            Ok(service) => service.request_stream(payload),
            Err(error) => stream::once(future::ready(Err(error))).boxed(),
        }
    }

    fn request_channel(&self, payloads: PayloadStream) -> PayloadStream {
        let handler = self.clone();
        SwitchOnFirst::new(payloads, move |first, rest| {
            handler
                .resolve(&first, Interaction::RequestChannel)?
                .open_channel(first, rest)
        })
        .boxed()
    }
}

/// Builder for [`RequestHandler`].
#[derive(Debug, Default)]
pub struct RequestHandlerBuilder {
    services: Vec<RpcService>,
}

impl RequestHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service.
    pub fn add_service(mut self, service: RpcService) -> Self {
        self.services.push(service);
        self
    }

    /// Add several services at once.
    pub fn add_services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = RpcService>,
    {
        self.services.extend(services);
        self
    }

    pub fn build(self) -> Result<RequestHandler, BuildError> {
        let mut services = HashMap::with_capacity(self.services.len());
        for service in self.services {
            let name = service.name().to_string();
            if services.contains_key(&name) {
                return Err(BuildError::DuplicateService(name));
            }
            services.insert(name, service);
        }

        Ok(RequestHandler {
            services: Arc::new(services),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{TryFutureExt, TryStreamExt};
    use rsocket_rpc_core::RpcMetadata;

    fn service(name: &str) -> RpcService {
        let reply = Bytes::from(name.to_string());
        RpcService::builder(name)
            .unary("who", move |_, _| {
                let reply = reply.clone();
                async move { Ok(Payload::from_data(reply)) }
            })
            .channel("count", |inbound, _| {
                inbound
                    .try_fold(0usize, |count, _| async move { Ok(count + 1) })
                    .map_ok(|count| Payload::from_data(count.to_string()))
                    .into_stream()
            })
            .build()
            .unwrap()
    }

    fn handler() -> RequestHandler {
        RequestHandler::builder()
            .add_services([service("Alpha"), service("Beta")])
            .build()
            .unwrap()
    }

    fn request(service: &str, method: &str) -> Payload {
        Payload::new(None, Some(RpcMetadata::new(service, method).encode().unwrap()))
    }

    #[tokio::test]
    async fn test_routes_by_service_name() {
        let handler = handler();
        for name in ["Alpha", "Beta"] {
            let response = handler.request_response(request(name, "who")).await.unwrap();
            assert_eq!(response.into_data(), Bytes::from(name));
        }
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let err = handler()
            .request_response(request("Gamma", "who"))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::UnknownService("Gamma".to_string()));

        let items: Vec<_> = handler().request_stream(request("Gamma", "who")).collect().await;
        assert_eq!(items, vec![Err(RpcError::UnknownService("Gamma".to_string()))]);
    }

    #[tokio::test]
    async fn test_channel_routes_on_first_payload() {
        let inbound = stream::iter(vec![
            Ok(request("Beta", "count")),
            Ok(Payload::from_data("x")),
            Ok(Payload::from_data("y")),
            Ok(Payload::from_data("z")),
        ])
        .boxed();

        let responses: Vec<_> = handler()
            .request_channel(inbound)
            .map_ok(Payload::into_data)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(responses, vec![Bytes::from_static(b"3")]);
    }

    #[test]
    fn test_duplicate_service_is_rejected() {
        let err = RequestHandler::builder()
            .add_service(service("Alpha"))
            .add_service(service("Alpha"))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateService("Alpha".to_string()));
    }

    #[test]
    fn test_lookup_by_name() {
        let handler = handler();
        assert_eq!(handler.service("Alpha").map(RpcService::name), Some("Alpha"));
        assert!(handler.service("Gamma").is_none());
    }
}
