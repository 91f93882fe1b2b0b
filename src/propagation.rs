//! Propagation of span metadata across process boundaries.
//!
//! The [`B3Propagator`] reads and writes the `X-B3-*` header family used by
//! Zipkin. Carriers plug in through the [`Extractor`] and [`Injector`]
//! traits; implementations for `HashMap<String, String>` are provided for
//! plain header maps.
//!
//! Header names are matched exactly. Transports that normalize header case
//! are expected to restore the canonical `X-B3-*` spelling before handing
//! the carrier over.
//!
//! ```
//! use std::collections::HashMap;
//! use zipkin_tracer::propagation::{B3Propagator, SAMPLED_HEADER, TRACE_ID_HEADER, SPAN_ID_HEADER};
//!
//! let mut headers = HashMap::new();
//! headers.insert(TRACE_ID_HEADER.to_string(), "7b".to_string());
//! headers.insert(SPAN_ID_HEADER.to_string(), "1c8".to_string());
//! headers.insert(SAMPLED_HEADER.to_string(), "true".to_string());
//!
//! let propagator = B3Propagator::new();
//! let metadata = propagator.extract(&headers).unwrap().unwrap();
//! assert_eq!(metadata.trace_id.to_u64(), 123);
//! assert_eq!(metadata.span_id.to_u64(), 456);
//! assert!(metadata.force_sampling);
//! ```

use std::collections::HashMap;

use thiserror::Error;

use crate::metadata::{SpanId, SpanMetadata, TraceId};

/// Header carrying the trace id in unpadded lowercase hex.
pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";
/// Header carrying the span id in unpadded lowercase hex.
pub const SPAN_ID_HEADER: &str = "X-B3-SpanId";
/// Header carrying the parent span id in unpadded lowercase hex.
pub const PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";
/// Header carrying the upstream sampling decision, `"true"` or `"false"`.
pub const SAMPLED_HEADER: &str = "X-B3-Sampled";
/// Header carrying the debug flags as a decimal integer.
pub const FLAGS_HEADER: &str = "X-B3-Flags";

/// Bit within [`FLAGS_HEADER`] marking a debug trace.
const DEBUG_FLAG: u64 = 1 << 1;

/// Extract values from an incoming carrier, such as a header map.
pub trait Extractor {
    /// Get the value for a key, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

/// Inject values into an outgoing carrier, such as a header map.
pub trait Injector {
    /// Set a key/value pair, replacing any previous value.
    fn set(&mut self, key: &str, value: String);
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(key).map(|value| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|key| key.as_str()).collect()
    }
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

/// Error produced when a propagation header is present but unreadable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagationError {
    /// A header value failed to parse. Malformed context is reported rather
    /// than silently replaced, so the caller can decide whether to start a
    /// fresh trace.
    #[error("malformed {header} header: {value:?}")]
    Malformed {
        /// The offending header.
        header: &'static str,
        /// The value as received.
        value: String,
    },
}

/// Codec for the `X-B3-*` propagation headers.
#[derive(Clone, Debug, Default)]
pub struct B3Propagator {
    _private: (),
}

impl B3Propagator {
    /// Create a new propagator.
    pub fn new() -> Self {
        B3Propagator::default()
    }

    fn extract_trace_id(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<Option<TraceId>, PropagationError> {
        match extractor.get(TRACE_ID_HEADER) {
            Some(value) => TraceId::from_hex(value).map(Some).map_err(|_| {
                PropagationError::Malformed {
                    header: TRACE_ID_HEADER,
                    value: value.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    fn extract_span_id(
        &self,
        extractor: &dyn Extractor,
        header: &'static str,
    ) -> Result<Option<SpanId>, PropagationError> {
        match extractor.get(header) {
            Some(value) => SpanId::from_hex(value).map(Some).map_err(|_| {
                PropagationError::Malformed {
                    header,
                    value: value.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    fn extract_flags(&self, extractor: &dyn Extractor) -> Result<u64, PropagationError> {
        match extractor.get(FLAGS_HEADER) {
            Some(value) => value.parse().map_err(|_| PropagationError::Malformed {
                header: FLAGS_HEADER,
                value: value.to_string(),
            }),
            None => Ok(0),
        }
    }

    /// Decode span metadata from a carrier.
    ///
    /// Returns `Ok(None)` when the carrier holds no trace context at all.
    /// A trace id yields metadata even without an upstream sampling
    /// decision; a debug flag or a `"true"` sampled header without a trace
    /// id starts a fresh forced root. Unreadable values are an error, never
    /// a silent default.
    pub fn extract(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<Option<SpanMetadata>, PropagationError> {
        let trace_id = self.extract_trace_id(extractor)?;
        let span_id = self.extract_span_id(extractor, SPAN_ID_HEADER)?;
        let parent_id = self.extract_span_id(extractor, PARENT_SPAN_ID_HEADER)?;
        let flags = self.extract_flags(extractor)?;
        let forced = flags & DEBUG_FLAG != 0 || extractor.get(SAMPLED_HEADER) == Some("true");

        match trace_id {
            Some(trace_id) => Ok(Some(SpanMetadata::new(
                trace_id,
                span_id.unwrap_or_else(SpanId::random),
                parent_id,
                forced,
            ))),
            None if forced => Ok(Some(SpanMetadata::new(
                TraceId::random(),
                span_id.unwrap_or_else(SpanId::random),
                None,
                true,
            ))),
            None => Ok(None),
        }
    }

    /// Encode span metadata into a carrier.
    ///
    /// The sampled header is always `"true"`: injected context describes a
    /// span that is being recorded. The flags header is written only for
    /// forced traces, and the parent header only when a parent exists.
    pub fn inject(&self, metadata: &SpanMetadata, injector: &mut dyn Injector) {
        injector.set(TRACE_ID_HEADER, format!("{:x}", metadata.trace_id));
        injector.set(SPAN_ID_HEADER, format!("{:x}", metadata.span_id));
        if let Some(parent_id) = metadata.parent_id {
            injector.set(PARENT_SPAN_ID_HEADER, format!("{parent_id:x}"));
        }
        injector.set(SAMPLED_HEADER, "true".to_string());
        if metadata.force_sampling {
            injector.set(FLAGS_HEADER, DEBUG_FLAG.to_string());
        }
    }
}
