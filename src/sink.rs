//! Span delivery targets.

#[cfg(any(feature = "testing", test))]
use std::sync::{Arc, Mutex};

use crate::error::TraceResult;
use crate::span::Span;

/// Destination for finalized spans.
///
/// Sinks are driven from the submission worker thread and may block; the
/// producer-facing API never calls a sink directly. A sink error marks the
/// collector unavailable, so implementations should fail fast rather than
/// retry internally.
pub trait SpanSink: Send {
    /// Deliver a batch of finalized spans.
    fn submit(&mut self, batch: Vec<Span>) -> TraceResult<()>;

    /// Release any held resources. Called once, at shutdown.
    fn shutdown(&mut self) {}
}

/// Sink that discards everything. Stands in when no collector host is
/// configured.
#[derive(Debug, Default)]
pub(crate) struct NoopSink;

impl SpanSink for NoopSink {
    fn submit(&mut self, _batch: Vec<Span>) -> TraceResult<()> {
        Ok(())
    }
}

/// A [`SpanSink`] that keeps spans in memory for inspection.
///
/// Clones share the same storage, so a test can hand one clone to the
/// tracer and assert on another:
///
/// ```
/// # #[cfg(feature = "testing")]
/// # {
/// use zipkin_tracer::{InMemorySink, Tracer};
///
/// let sink = InMemorySink::new();
/// let tracer = Tracer::builder().with_sink(sink.clone()).build().unwrap();
/// // ... drive the tracer ...
/// let finished = sink.get_finished_spans().unwrap();
/// # drop(tracer);
/// # assert!(finished.is_empty());
/// # }
/// ```
#[cfg(any(feature = "testing", test))]
#[derive(Clone, Debug, Default)]
pub struct InMemorySink {
    spans: Arc<Mutex<Vec<Span>>>,
}

#[cfg(any(feature = "testing", test))]
impl InMemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        InMemorySink::default()
    }

    /// Spans delivered so far, in delivery order.
    ///
    /// Returns an error if the internal lock was poisoned.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<Span>> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(crate::error::TraceError::from)
    }

    /// Discard all recorded spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans| spans.clear());
    }
}

#[cfg(any(feature = "testing", test))]
impl SpanSink for InMemorySink {
    fn submit(&mut self, mut batch: Vec<Span>) -> TraceResult<()> {
        self.spans
            .lock()
            .map(|mut spans| spans.append(&mut batch))
            .map_err(crate::error::TraceError::from)
    }
}
