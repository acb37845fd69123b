//! Trace context propagation.
//!
//! Requesters propagate their active span as a text map (the carrier format
//! used by OpenTracing-style tracers) encoded into the `tracing` section of
//! the [`RpcMetadata`](crate::RpcMetadata) frame:
//!
//! ```text
//! ([key_len:2][key][value_len:2][value])*
//! ```
//!
//! W3C `traceparent` and Zipkin B3 entries are understood when present.

use bytes::{Bytes, BytesMut};

use crate::metadata::{MetadataError, get_string, put_prefixed};

/// W3C trace context header name.
pub const TRACEPARENT: &str = "traceparent";
/// Zipkin B3 trace id header name.
pub const B3_TRACE_ID: &str = "x-b3-traceid";
/// Zipkin B3 span id header name.
pub const B3_SPAN_ID: &str = "x-b3-spanid";
/// Zipkin B3 sampling header name.
pub const B3_SAMPLED: &str = "x-b3-sampled";

/// A decoded text-map trace carrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpanContext {
    entries: Vec<(String, String)>,
}

impl SpanContext {
    /// Create an empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing entry with the same key.
    ///
    /// Keys are compared case-insensitively, like HTTP header names.
    pub fn insert<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.entries.push((key, value.into()));
        self
    }

    /// Look up an entry by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all entries in carrier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the carrier has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The parsed W3C `traceparent` entry, if present and well formed.
    pub fn traceparent(&self) -> Option<TraceParent> {
        self.get(TRACEPARENT).and_then(TraceParent::parse)
    }

    /// The remote trace id, from `traceparent` or B3 headers.
    pub fn trace_id(&self) -> Option<String> {
        match self.traceparent() {
            Some(parent) => Some(parent.trace_id),
            None => self.get(B3_TRACE_ID).map(str::to_owned),
        }
    }

    /// The remote parent span id, from `traceparent` or B3 headers.
    pub fn parent_span_id(&self) -> Option<String> {
        match self.traceparent() {
            Some(parent) => Some(parent.parent_id),
            None => self.get(B3_SPAN_ID).map(str::to_owned),
        }
    }

    /// Whether the remote side sampled this trace, when it said so.
    pub fn sampled(&self) -> Option<bool> {
        if let Some(parent) = self.traceparent() {
            return Some(parent.sampled);
        }
        self.get(B3_SAMPLED).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    /// Encode the carrier into its binary form.
    pub fn encode(&self) -> Result<Bytes, MetadataError> {
        let capacity = self
            .entries
            .iter()
            .map(|(k, v)| 4 + k.len() + v.len())
            .sum();
        let mut buf = BytesMut::with_capacity(capacity);
        for (key, value) in &self.entries {
            put_prefixed(&mut buf, "trace key", key.as_bytes())?;
            put_prefixed(&mut buf, "trace value", value.as_bytes())?;
        }
        Ok(buf.freeze())
    }

    /// Decode a binary carrier.
    ///
    /// An empty buffer means the requester propagated no trace and yields
    /// `Ok(None)`.
    pub fn decode(tracing: &Bytes) -> Result<Option<Self>, MetadataError> {
        if tracing.is_empty() {
            return Ok(None);
        }

        let mut buf = tracing.clone();
        let mut entries = Vec::new();
        while !buf.is_empty() {
            let key = get_string(&mut buf, "trace key")?;
            let value = get_string(&mut buf, "trace value")?;
            entries.push((key, value));
        }
        Ok(Some(Self { entries }))
    }
}

/// A parsed W3C `traceparent` value (`00-<trace-id>-<parent-id>-<flags>`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: String,
    pub parent_id: String,
    pub sampled: bool,
}

impl TraceParent {
    /// Parse a `traceparent` value, rejecting malformed or all-zero ids.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if version != "00"
            || !is_hex_id(trace_id, 32)
            || !is_hex_id(parent_id, 16)
            || !is_hex(flags, 2)
        {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_id: parent_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 0x01,
        })
    }

    /// Render as a `traceparent` header value.
    pub fn to_header_value(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id,
            self.parent_id,
            u8::from(self.sampled)
        )
    }
}

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_hex_id(value: &str, len: usize) -> bool {
    is_hex(value, len) && value.bytes().any(|b| b != b'0')
}
