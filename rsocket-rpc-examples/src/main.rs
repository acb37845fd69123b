//! Drives every interaction shape against an in-process `Echo` service.
//!
//! There is no network transport here: the binary plays the part of the
//! RSocket connection and calls the [`Responder`] directly.
//!
//! Run with: cargo run --bin echo
//! More logs: RUST_LOG=rsocket_rpc=debug cargo run --bin echo

use std::sync::Arc;

use futures::{StreamExt, stream};
use rsocket_rpc::prelude::*;
use rsocket_rpc::NoopMeterRegistry;
use rsocket_rpc_examples::{echo_service, request, text};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let echo = echo_service(Arc::new(NoopMeterRegistry))?;
    let handler = RequestHandler::builder().add_service(echo).build()?;

    println!("=== rsocket-rpc: Echo ===");

    // request-response
    let response = handler.request_response(request("say", "hi")?).await?;
    println!("say(\"hi\")        -> {:?}", text(response)?);

    // unknown method
    match handler.request_response(request("shout", "hi")?).await {
        Ok(_) => println!("shout(\"hi\")      -> unexpected success"),
        Err(error) => println!("shout(\"hi\")      -> {error} ({})", error.code()),
    }

    // fire-and-forget
    handler.fire_and_forget(request("say", "fire")?).await;
    println!("say(\"fire\")      -> (fire-and-forget)");

    // request-stream
    let mut ticks = handler.request_stream(request("ticks", "4")?);
    let mut seen = Vec::new();
    while let Some(tick) = ticks.next().await {
        seen.push(text(tick?)?);
    }
    println!("ticks(\"4\")       -> {seen:?}");

    // request-channel: the first payload routes, the rest is upper-cased
    let inbound = stream::iter(vec![
        request("upper", "")?,
        request("upper", "a")?,
        request("upper", "b")?,
    ])
    .map(Ok)
    .boxed();
    let mut replies = handler.request_channel(inbound);
    let mut upper = Vec::new();
    while let Some(reply) = replies.next().await {
        upper.push(text(reply?)?);
    }
    println!("upper([a, b])    -> {upper:?}");

    // metadata-push
    let metadata = RpcMetadata::new("Echo", "say").encode()?;
    if let Err(error) = handler.metadata_push(Payload::new(None, Some(metadata))).await {
        println!("metadata push    -> {error}");
    }

    Ok(())
}
