//! RPC metadata framing.
//!
//! The first payload of every rsocket-rpc interaction carries a metadata
//! frame naming the target service and method:
//!
//! ```text
//! [version:2][service_len:2][service][method_len:2][method][tracing_len:2][tracing][metadata...]
//! ```
//!
//! All integers are big-endian. `tracing` holds an encoded
//! [`SpanContext`](crate::SpanContext); the trailing bytes are application
//! metadata passed through untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The metadata frame version written by this crate.
pub const METADATA_VERSION: u16 = 1;

/// Size of each length prefix in the frame.
const LENGTH_PREFIX_SIZE: usize = 2;

/// Errors raised while encoding or decoding an RPC metadata frame.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The frame ended before a field was complete.
    #[error("truncated {field}: expected {expected} bytes, got {actual}")]
    Truncated {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The frame was written by an unsupported protocol version.
    #[error("unsupported metadata version: {0}")]
    UnsupportedVersion(u16),

    /// A string field was not valid UTF-8.
    #[error("{0} is not valid utf-8")]
    InvalidUtf8(&'static str),

    /// A field does not fit in its 16-bit length prefix.
    #[error("{field} is {len} bytes, longer than the 65535 byte maximum")]
    FieldTooLong { field: &'static str, len: usize },
}

/// A decoded RPC metadata frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcMetadata {
    service: String,
    method: String,
    tracing: Bytes,
    metadata: Bytes,
}

impl RpcMetadata {
    /// Create a frame routing to `service`/`method` with no tracing or metadata.
    pub fn new<S: Into<String>, M: Into<String>>(service: S, method: M) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            tracing: Bytes::new(),
            metadata: Bytes::new(),
        }
    }

    /// Attach an encoded trace carrier.
    pub fn with_tracing(mut self, tracing: Bytes) -> Self {
        self.tracing = tracing;
        self
    }

    /// Attach application metadata.
    pub fn with_metadata(mut self, metadata: Bytes) -> Self {
        self.metadata = metadata;
        self
    }

    /// The target service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The target method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The encoded trace carrier (empty when the caller sent none).
    pub fn tracing(&self) -> &Bytes {
        &self.tracing
    }

    /// The application metadata.
    pub fn metadata(&self) -> &Bytes {
        &self.metadata
    }

    /// Encode into a metadata frame.
    pub fn encode(&self) -> Result<Bytes, MetadataError> {
        let service = self.service.as_bytes();
        let method = self.method.as_bytes();

        let mut frame = BytesMut::with_capacity(
            LENGTH_PREFIX_SIZE * 4
                + service.len()
                + method.len()
                + self.tracing.len()
                + self.metadata.len(),
        );
        frame.put_u16(METADATA_VERSION);
        put_prefixed(&mut frame, "service", service)?;
        put_prefixed(&mut frame, "method", method)?;
        put_prefixed(&mut frame, "tracing", &self.tracing)?;
        frame.put_slice(&self.metadata);
        Ok(frame.freeze())
    }

    /// Decode a metadata frame.
    ///
    /// `tracing` and `metadata` are zero-copy slices of `frame`.
    pub fn decode(frame: &Bytes) -> Result<Self, MetadataError> {
        let mut buf = frame.clone();

        let version = get_u16(&mut buf, "version")?;
        if version != METADATA_VERSION {
            return Err(MetadataError::UnsupportedVersion(version));
        }

        let service = get_string(&mut buf, "service")?;
        let method = get_string(&mut buf, "method")?;
        let tracing = get_prefixed(&mut buf, "tracing")?;

        Ok(Self {
            service,
            method,
            tracing,
            metadata: buf,
        })
    }
}

pub(crate) fn put_prefixed(
    buf: &mut BytesMut,
    field: &'static str,
    value: &[u8],
) -> Result<(), MetadataError> {
    let len = u16::try_from(value.len()).map_err(|_| MetadataError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

pub(crate) fn get_u16(buf: &mut Bytes, field: &'static str) -> Result<u16, MetadataError> {
    if buf.remaining() < LENGTH_PREFIX_SIZE {
        return Err(MetadataError::Truncated {
            field,
            expected: LENGTH_PREFIX_SIZE,
            actual: buf.remaining(),
        });
    }
    Ok(buf.get_u16())
}

pub(crate) fn get_prefixed(buf: &mut Bytes, field: &'static str) -> Result<Bytes, MetadataError> {
    let len = get_u16(buf, field)? as usize;
    if buf.remaining() < len {
        return Err(MetadataError::Truncated {
            field,
            expected: len,
            actual: buf.remaining(),
        });
    }
    Ok(buf.split_to(len))
}

pub(crate) fn get_string(buf: &mut Bytes, field: &'static str) -> Result<String, MetadataError> {
    let raw = get_prefixed(buf, field)?;
    String::from_utf8(raw.to_vec()).map_err(|_| MetadataError::InvalidUtf8(field))
}
