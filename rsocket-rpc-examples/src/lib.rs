//! Shared pieces of the demo binaries: an `Echo` service and a helper to
//! address it.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use rsocket_rpc::prelude::*;
use rsocket_rpc::{Bytes, MeterRegistry};

/// Name under which the demo service is registered.
pub const ECHO: &str = "Echo";

/// Build the `Echo` service.
///
/// - `say` (request-response, fire-and-forget): answers with its input
/// - `ticks` (request-stream): counts from 1 to the number in the request
/// - `upper` (request-channel): upper-cases every inbound body
pub fn echo_service(registry: Arc<dyn MeterRegistry>) -> Result<RpcService, BuildError> {
    let builder = RpcService::builder(ECHO).meter_registry(registry);
    #[cfg(feature = "compression-gzip")]
    let builder = builder.marshaller(rsocket_rpc::GzipMarshaller::default());

    builder
        .unary("say", |data: Bytes, _| async move {
            tracing::info!(body = ?data, "say");
            Ok(Payload::from_data(data))
        })
        .stream("ticks", |data: Bytes, _| {
            let count = std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(3);
            async_stream::stream! {
                for tick in 1..=count {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    yield Ok(Payload::from_data(tick.to_string()));
                }
            }
        })
        .channel("upper", |inbound, _| {
            inbound.map_ok(|body| Payload::from_data(body.to_ascii_uppercase()))
        })
        .build()
}

/// A request addressed to `method` of the `Echo` service.
///
/// With the `compression-gzip` feature the body is compressed the way the
/// service expects it.
pub fn request(method: &str, data: &str) -> Result<Payload, RpcError> {
    let metadata = RpcMetadata::new(ECHO, method).encode()?;
    marshaller().marshall(Payload::new(
        Some(Bytes::copy_from_slice(data.as_bytes())),
        Some(metadata),
    ))
}

/// Decode a response body into text.
pub fn text(payload: Payload) -> Result<String, RpcError> {
    let body = marshaller().unmarshall(payload)?.into_data();
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(feature = "compression-gzip")]
fn marshaller() -> rsocket_rpc::GzipMarshaller {
    rsocket_rpc::GzipMarshaller::default()
}

#[cfg(not(feature = "compression-gzip"))]
fn marshaller() -> rsocket_rpc::IdentityMarshaller {
    rsocket_rpc::IdentityMarshaller
}
