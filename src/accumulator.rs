//! Open-span accumulation and automatic flushing.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{TraceError, TraceResult};
use crate::metadata::{CorrelationId, SpanMetadata};
use crate::pipeline::SubmissionPipeline;
use crate::span::{Annotation, AnnotationValue, BinaryAnnotation, Span};
use crate::state::TracingState;
use crate::tracer_debug;

/// Longest the reaper sleeps between expiry sweeps.
const MAX_REAPER_TICK: Duration = Duration::from_millis(500);
/// Shortest the reaper sleeps, so tiny TTLs cannot spin a core.
const MIN_REAPER_TICK: Duration = Duration::from_millis(10);

/// Mutable state of every span that is open right now.
///
/// Spans are keyed by correlation id and mutated in place; a flush removes
/// the span, finalizes it and hands it to the submission pipeline.
/// Annotating, flushing and sweeping are no-ops while tracing is disabled,
/// whether by configuration or by a tripped availability breaker; opening
/// is gated upstream by the sampler.
pub(crate) struct SpanAccumulator {
    open_spans: DashMap<CorrelationId, Span>,
    deadlines: DashMap<CorrelationId, Instant>,
    span_ttl: Duration,
    pipeline: SubmissionPipeline,
    state: Arc<TracingState>,
}

impl SpanAccumulator {
    pub(crate) fn new(
        span_ttl: Duration,
        pipeline: SubmissionPipeline,
        state: Arc<TracingState>,
    ) -> Self {
        SpanAccumulator {
            open_spans: DashMap::new(),
            deadlines: DashMap::new(),
            span_ttl,
            pipeline,
            state,
        }
    }

    /// Open a span for `id` and arm its expiry deadline. The first open
    /// wins; the decision cache upstream makes reopening an id a no-op.
    pub(crate) fn open_span(
        &self,
        id: CorrelationId,
        metadata: SpanMetadata,
        service_name: &str,
        rpc_name: &str,
    ) {
        match self.open_spans.entry(id) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(Span::new(metadata, service_name, rpc_name));
            }
        }
        self.deadlines.insert(id, Instant::now() + self.span_ttl);
    }

    /// Append a timestamped annotation to the open span for `id`. Unknown
    /// and already-flushed ids are ignored.
    pub(crate) fn add_annotation(&self, id: CorrelationId, value: impl Into<String>) {
        if !self.state.is_enabled() {
            return;
        }
        if let Some(mut span) = self.open_spans.get_mut(&id) {
            span.annotations.push(Annotation {
                timestamp: SystemTime::now(),
                value: value.into(),
            });
        }
    }

    /// Attach a typed key/value fact to the open span for `id`. Unknown
    /// and already-flushed ids are ignored.
    pub(crate) fn add_binary_annotation(
        &self,
        id: CorrelationId,
        key: impl Into<String>,
        value: AnnotationValue,
    ) {
        if !self.state.is_enabled() {
            return;
        }
        if let Some(mut span) = self.open_spans.get_mut(&id) {
            span.binary_annotations.push(BinaryAnnotation {
                key: key.into(),
                value,
            });
        }
    }

    /// Finalize the span for `id` and hand it to the pipeline. Flushing an
    /// id with no open span is a no-op, so double flushes are harmless.
    pub(crate) fn flush(&self, id: CorrelationId, cancel_pending_timer: bool) {
        if !self.state.is_enabled() {
            return;
        }
        if cancel_pending_timer {
            self.deadlines.remove(&id);
        }
        if let Some((_, mut span)) = self.open_spans.remove(&id) {
            span.finalize(SystemTime::now());
            self.pipeline.submit(span);
        }
    }

    /// Hand pre-built spans straight to the pipeline, bypassing sampling
    /// and accumulation.
    pub(crate) fn submit_raw(&self, spans: Vec<Span>) {
        if !self.state.is_enabled() {
            return;
        }
        for span in spans {
            self.pipeline.submit(span);
        }
    }

    /// Flush every span whose deadline has passed. Skipped entirely while
    /// tracing is disabled so an outage does not consume open spans; they
    /// are reaped after recovery instead.
    pub(crate) fn flush_expired(&self) {
        if !self.state.is_enabled() {
            return;
        }
        let now = Instant::now();
        let expired: Vec<CorrelationId> = self
            .deadlines
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in expired {
            // claim the deadline so concurrent sweeps flush each id once
            if self.deadlines.remove(&id).is_some() {
                tracer_debug!(name: "SpanAccumulator.AutoFlush", id = format!("{id}"));
                self.flush(id, false);
            }
        }
    }

    pub(crate) fn span_ttl(&self) -> Duration {
        self.span_ttl
    }

    #[cfg(test)]
    pub(crate) fn open_span_count(&self) -> usize {
        self.open_spans.len()
    }

    #[cfg(test)]
    pub(crate) fn armed_deadline_count(&self) -> usize {
        self.deadlines.len()
    }
}

/// Handle to the reaper thread; stopping joins it.
pub(crate) struct ReaperHandle {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReaperHandle {
    pub(crate) fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start the background thread that sweeps expired spans.
pub(crate) fn spawn_reaper(accumulator: Arc<SpanAccumulator>) -> TraceResult<ReaperHandle> {
    let (stop_tx, stop_rx) = bounded(1);
    let tick = accumulator
        .span_ttl()
        .min(MAX_REAPER_TICK)
        .max(MIN_REAPER_TICK);
    let handle = thread::Builder::new()
        .name("ZipkinTracer.Reaper".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(tick) {
                Err(RecvTimeoutError::Timeout) => accumulator.flush_expired(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .map_err(|err| TraceError::Other(format!("failed to spawn span reaper: {err}")))?;
    Ok(ReaperHandle {
        stop_tx,
        handle: Some(handle),
    })
}
