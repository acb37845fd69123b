//! Core protocol types for rsocket-rpc.
//!
//! This crate provides the types shared by every participant of the RPC
//! protocol, on either side of an RSocket connection.
//!
//! ## Modules
//!
//! - [`payload`]: The transport payload (`data` + `metadata`)
//! - [`metadata`]: The RPC metadata frame carrying service, method and tracing
//! - [`span_context`]: The text-map trace carrier embedded in the metadata frame
//! - [`error`]: Error codes and the [`RpcError`] taxonomy
//! - [`responder`]: The transport seam implemented by servers

mod error;
mod metadata;
mod payload;
mod responder;
mod span_context;

pub use error::*;
pub use metadata::*;
pub use payload::*;
pub use responder::*;
pub use span_context::*;
