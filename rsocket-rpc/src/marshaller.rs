//! Payload body marshalling.
//!
//! A [`Marshaller`] transforms the `data` half of a payload on its way into
//! a handler (`unmarshall`) and on its way out (`marshall`). Metadata is
//! routing information and always passes through untouched.

use std::sync::Arc;

#[cfg(feature = "compression-gzip")]
use bytes::Bytes;
use rsocket_rpc_core::{Payload, RpcError};

/// Transforms payload bodies between their wire and handler forms.
///
/// Implementations must be pure: no side effects, and `metadata` must be
/// returned unchanged.
pub trait Marshaller: Send + Sync + 'static {
    /// Convert a handler payload into its wire form.
    fn marshall(&self, payload: Payload) -> Result<Payload, RpcError>;

    /// Convert a wire payload into the form handlers expect.
    fn unmarshall(&self, payload: Payload) -> Result<Payload, RpcError>;
}

impl<M> Marshaller for Arc<M>
where
    M: Marshaller + ?Sized,
{
    fn marshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        (**self).marshall(payload)
    }

    fn unmarshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        (**self).unmarshall(payload)
    }
}

/// Passes payloads through unchanged. This is the default marshaller.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityMarshaller;

impl Marshaller for IdentityMarshaller {
    fn marshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        Ok(payload)
    }

    fn unmarshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        Ok(payload)
    }
}

/// Gzip-compresses outbound bodies and inflates inbound ones.
///
/// Absent bodies stay absent. A body that does not inflate fails the
/// interaction with [`RpcError::Marshalling`].
#[cfg(feature = "compression-gzip")]
#[derive(Clone, Copy, Debug, Default)]
pub struct GzipMarshaller {
    level: flate2::Compression,
}

#[cfg(feature = "compression-gzip")]
impl GzipMarshaller {
    /// Create a gzip marshaller compressing at `level`, clamped to 0-9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }
}

#[cfg(feature = "compression-gzip")]
impl Marshaller for GzipMarshaller {
    fn marshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        use std::io::Write;

        let Some(data) = payload.data() else {
            return Ok(payload);
        };
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::with_capacity(data.len()), self.level);
        let deflated = encoder
            .write_all(data)
            .and_then(|()| encoder.finish())
            .map_err(|e| RpcError::Marshalling(format!("gzip compression failed: {e}")))?;
        Ok(payload.with_data(Some(Bytes::from(deflated))))
    }

    fn unmarshall(&self, payload: Payload) -> Result<Payload, RpcError> {
        use std::io::Read;

        let Some(data) = payload.data() else {
            return Ok(payload);
        };
        let mut inflated = Vec::new();
        flate2::read::GzDecoder::new(&data[..])
            .read_to_end(&mut inflated)
            .map_err(|e| RpcError::Marshalling(format!("gzip decompression failed: {e}")))?;
        Ok(payload.with_data(Some(Bytes::from(inflated))))
    }
}
