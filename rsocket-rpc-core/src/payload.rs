//! The unit of data exchanged over an RSocket stream.

use bytes::Bytes;

/// A transport payload.
///
/// Both halves are opaque to the transport. For rsocket-rpc, `metadata`
/// carries an encoded [`RpcMetadata`](crate::RpcMetadata) frame on the first
/// payload of every interaction and `data` carries the marshalled body.
///
/// Payloads are never mutated in place: transformations build a new value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    data: Option<Bytes>,
    metadata: Option<Bytes>,
}

impl Payload {
    /// Create a payload from optional data and metadata.
    pub fn new(data: Option<Bytes>, metadata: Option<Bytes>) -> Self {
        Self { data, metadata }
    }

    /// Create a payload carrying only data.
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            metadata: None,
        }
    }

    /// Get the data, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Get the metadata, if any.
    pub fn metadata(&self) -> Option<&Bytes> {
        self.metadata.as_ref()
    }

    /// Whether this payload carries non-empty metadata.
    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Length of the data in bytes (0 when absent).
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Bytes::len)
    }

    /// Replace the data, keeping the metadata untouched.
    pub fn with_data(self, data: Option<Bytes>) -> Self {
        Self {
            data,
            metadata: self.metadata,
        }
    }

    /// Split into `(data, metadata)`, substituting empty bytes for absent halves.
    pub fn into_parts(self) -> (Bytes, Bytes) {
        (
            self.data.unwrap_or_default(),
            self.metadata.unwrap_or_default(),
        )
    }

    /// Consume the payload, returning its data (empty when absent).
    pub fn into_data(self) -> Bytes {
        self.data.unwrap_or_default()
    }
}
