//! The span data model.

use std::time::{Duration, SystemTime};

use crate::metadata::SpanMetadata;

/// Standard annotation marking the moment a client sent a request.
pub const CLIENT_SEND: &str = "cs";
/// Standard annotation marking the moment a client received the response.
pub const CLIENT_RECV: &str = "cr";
/// Standard annotation marking the moment a server received a request.
pub const SERVER_RECV: &str = "sr";
/// Standard annotation marking the moment a server sent the response.
pub const SERVER_SEND: &str = "ss";

/// A timestamped event recorded within a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// When the event happened.
    pub timestamp: SystemTime,
    /// The event text.
    pub value: String,
}

/// A typed value carried by a [`BinaryAnnotation`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    /// UTF-8 text.
    String(String),
    /// Boolean.
    Bool(bool),
    /// 16-bit signed integer.
    I16(i16),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit float.
    Double(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl AnnotationValue {
    /// The Zipkin `AnnotationType` code for this value.
    pub(crate) fn type_code(&self) -> i32 {
        match self {
            AnnotationValue::Bool(_) => 0,
            AnnotationValue::Bytes(_) => 1,
            AnnotationValue::I16(_) => 2,
            AnnotationValue::I32(_) => 3,
            AnnotationValue::I64(_) => 4,
            AnnotationValue::Double(_) => 5,
            AnnotationValue::String(_) => 6,
        }
    }

    /// Big-endian wire encoding of the value.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match self {
            AnnotationValue::String(value) => value.as_bytes().to_vec(),
            AnnotationValue::Bool(value) => vec![u8::from(*value)],
            AnnotationValue::I16(value) => value.to_be_bytes().to_vec(),
            AnnotationValue::I32(value) => value.to_be_bytes().to_vec(),
            AnnotationValue::I64(value) => value.to_be_bytes().to_vec(),
            AnnotationValue::Double(value) => value.to_bits().to_be_bytes().to_vec(),
            AnnotationValue::Bytes(value) => value.clone(),
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(value: &str) -> Self {
        AnnotationValue::String(value.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(value: String) -> Self {
        AnnotationValue::String(value)
    }
}

impl From<bool> for AnnotationValue {
    fn from(value: bool) -> Self {
        AnnotationValue::Bool(value)
    }
}

impl From<i16> for AnnotationValue {
    fn from(value: i16) -> Self {
        AnnotationValue::I16(value)
    }
}

impl From<i32> for AnnotationValue {
    fn from(value: i32) -> Self {
        AnnotationValue::I32(value)
    }
}

impl From<i64> for AnnotationValue {
    fn from(value: i64) -> Self {
        AnnotationValue::I64(value)
    }
}

impl From<f64> for AnnotationValue {
    fn from(value: f64) -> Self {
        AnnotationValue::Double(value)
    }
}

impl From<Vec<u8>> for AnnotationValue {
    fn from(value: Vec<u8>) -> Self {
        AnnotationValue::Bytes(value)
    }
}

impl From<&[u8]> for AnnotationValue {
    fn from(value: &[u8]) -> Self {
        AnnotationValue::Bytes(value.to_vec())
    }
}

/// A typed key/value fact attached to a span.
///
/// Keys are not deduplicated; repeated keys are delivered in the order they
/// were recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryAnnotation {
    /// The fact's name.
    pub key: String,
    /// The fact's value.
    pub value: AnnotationValue,
}

/// One recorded unit of work.
///
/// A span opens when sampling admits its correlation id and accumulates
/// annotations until it is flushed, either explicitly or by the reaper once
/// its time-to-live passes. After finalization it is immutable and travels
/// through the submission pipeline to the collector.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    /// Identity within the trace tree.
    pub metadata: SpanMetadata,
    /// Service the span was recorded in.
    pub service_name: String,
    /// Name of the traced operation.
    pub rpc_name: String,
    /// Timestamped events, in recording order.
    pub annotations: Vec<Annotation>,
    /// Typed key/value facts, in recording order.
    pub binary_annotations: Vec<BinaryAnnotation>,
    /// When the unit of work began.
    pub start_time: SystemTime,
    /// Set once the span is finalized.
    pub end_time: Option<SystemTime>,
}

impl Span {
    /// Open a span starting now, with no annotations yet.
    pub fn new(
        metadata: SpanMetadata,
        service_name: impl Into<String>,
        rpc_name: impl Into<String>,
    ) -> Self {
        Span {
            metadata,
            service_name: service_name.into(),
            rpc_name: rpc_name.into(),
            annotations: Vec::new(),
            binary_annotations: Vec::new(),
            start_time: SystemTime::now(),
            end_time: None,
        }
    }

    /// Close the span at `at`. The first finalization wins.
    pub(crate) fn finalize(&mut self, at: SystemTime) {
        if self.end_time.is_none() {
            self.end_time = Some(at);
        }
    }

    /// Wall-clock duration of the span, once finalized.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .and_then(|end| end.duration_since(self.start_time).ok())
    }
}
