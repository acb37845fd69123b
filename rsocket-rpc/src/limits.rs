//! Payload size limits.
//!
//! - **Receive limit** (`receive_max_bytes`): bounds inbound bodies before they
//!   are unmarshalled, so oversized requests never reach a handler.
//! - **Send limit** (`send_max_bytes`): bounds outbound bodies after they are
//!   marshalled.

use rsocket_rpc_core::RpcError;

/// Configuration for payload body size limits.
///
/// By default, no limits are applied.
///
/// # Example
///
/// ```rust
/// use rsocket_rpc::MessageLimits;
///
/// let limits = MessageLimits::new()
///     .receive_max_bytes(4 * 1024 * 1024)
///     .send_max_bytes(8 * 1024 * 1024);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageLimits {
    receive_max_bytes: Option<usize>,
    send_max_bytes: Option<usize>,
}

impl MessageLimits {
    /// Create limits with no restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum size of inbound bodies.
    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.receive_max_bytes = Some(max);
        self
    }

    /// Set the maximum size of outbound bodies.
    pub fn send_max_bytes(mut self, max: usize) -> Self {
        self.send_max_bytes = Some(max);
        self
    }

    /// Returns the receive limit, or `None` if unlimited.
    pub fn get_receive_max_bytes(&self) -> Option<usize> {
        self.receive_max_bytes
    }

    /// Returns the send limit, or `None` if unlimited.
    pub fn get_send_max_bytes(&self) -> Option<usize> {
        self.send_max_bytes
    }

    pub(crate) fn check_receive(&self, size: usize) -> Result<(), RpcError> {
        check(size, self.receive_max_bytes)
    }

    pub(crate) fn check_send(&self, size: usize) -> Result<(), RpcError> {
        check(size, self.send_max_bytes)
    }
}

fn check(size: usize, limit: Option<usize>) -> Result<(), RpcError> {
    match limit {
        Some(limit) if size > limit => Err(RpcError::MessageTooLarge { size, limit }),
        _ => Ok(()),
    }
}
