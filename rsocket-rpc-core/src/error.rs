//! rsocket-rpc error codes and types.
//!
//! This module provides the error types shared by responders and requesters:
//! - [`ErrorCode`]: RSocket ERROR frame codes for stream-level failures
//! - [`RpcError`]: Every way an interaction can fail

use crate::metadata::MetadataError;
use crate::responder::Interaction;

/// RSocket ERROR frame codes that apply to a single stream.
///
/// Connection-level codes (setup, keepalive) belong to the transport and are
/// not represented here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ApplicationError = 0x0000_0201,
    Rejected = 0x0000_0202,
    Canceled = 0x0000_0203,
    Invalid = 0x0000_0204,
}

impl ErrorCode {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ApplicationError => "APPLICATION_ERROR",
            ErrorCode::Rejected => "REJECTED",
            ErrorCode::Canceled => "CANCELED",
            ErrorCode::Invalid => "INVALID",
        }
    }

    /// The numeric code written into an ERROR frame.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Look up a stream-level code by its numeric value.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0000_0201 => Some(ErrorCode::ApplicationError),
            0x0000_0202 => Some(ErrorCode::Rejected),
            0x0000_0203 => Some(ErrorCode::Canceled),
            0x0000_0204 => Some(ErrorCode::Invalid),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way an rsocket-rpc interaction can fail.
///
/// Routing and head-splitting errors (`MissingMetadata`, `InvalidMetadata`,
/// `UnknownMethod`, `UnknownService`, `InteractionMismatch`, `EmptyChannel`)
/// are raised before any handler is invoked. `Application` carries failures
/// produced by handler code.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The first payload of the interaction carried no metadata.
    #[error("metadata is empty")]
    MissingMetadata,

    /// The metadata could not be decoded as an RPC metadata frame.
    #[error("invalid rpc metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    /// No handler is registered for the routed method.
    #[error("no method {method} found in {service} handler")]
    UnknownMethod { method: String, service: String },

    /// No service is registered under the routed service name.
    #[error("no service {0} registered")]
    UnknownService(String),

    /// The handler registered for the method serves a different interaction.
    #[error("method {method} does not serve {interaction} interactions")]
    InteractionMismatch {
        method: String,
        interaction: Interaction,
    },

    /// A channel's inbound stream completed before its first payload.
    #[error("channel completed before its routing payload arrived")]
    EmptyChannel,

    /// A channel continuation stream was subscribed more than once.
    #[error("continuation stream already has a subscriber")]
    MultipleSubscription,

    /// The capability is not implemented by this responder.
    #[error("{0} is not implemented")]
    UnsupportedCapability(&'static str),

    /// The marshaller rejected a payload body.
    #[error("marshalling failed: {0}")]
    Marshalling(String),

    /// A payload body exceeded the configured size limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// The interaction was cancelled by the peer.
    #[error("interaction cancelled")]
    Cancelled,

    /// An error raised by handler code.
    #[error("{0}")]
    Application(String),
}

impl RpcError {
    /// Create an application error with a message.
    pub fn application<S: Into<String>>(message: S) -> Self {
        RpcError::Application(message.into())
    }

    /// Create an unknown method error.
    pub fn unknown_method<M: Into<String>, S: Into<String>>(method: M, service: S) -> Self {
        RpcError::UnknownMethod {
            method: method.into(),
            service: service.into(),
        }
    }

    /// The ERROR frame code the transport should send for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::MissingMetadata
            | RpcError::InvalidMetadata(_)
            | RpcError::InteractionMismatch { .. }
            | RpcError::EmptyChannel
            | RpcError::MessageTooLarge { .. } => ErrorCode::Invalid,
            RpcError::UnknownMethod { .. }
            | RpcError::UnknownService(_)
            | RpcError::UnsupportedCapability(_) => ErrorCode::Rejected,
            RpcError::Cancelled => ErrorCode::Canceled,
            RpcError::MultipleSubscription
            | RpcError::Marshalling(_)
            | RpcError::Application(_) => ErrorCode::ApplicationError,
        }
    }
}
