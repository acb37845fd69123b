//! Serves a few requests and prints the collected server meters as JSON.
//!
//! Run with: cargo run --bin metrics-snapshot

use std::sync::Arc;

use futures::StreamExt;
use rsocket_rpc::SimpleMeterRegistry;
use rsocket_rpc::prelude::*;
use rsocket_rpc_examples::{echo_service, request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(SimpleMeterRegistry::new());
    let echo = echo_service(registry.clone())?;

    for word in ["one", "two", "three"] {
        echo.request_response(request("say", word)?).await?;
    }
    let _ = echo.request_response(request("shout", "ignored")?).await;

    // Cancelled after two of five ticks.
    let ticks: Vec<_> = echo
        .request_stream(request("ticks", "5")?)
        .take(2)
        .collect()
        .await;
    println!("received {} ticks before cancelling", ticks.len());

    println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);
    Ok(())
}
