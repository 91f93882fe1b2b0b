//! Backpressured span submission.
//!
//! Producers hand finalized spans to a bounded queue and return
//! immediately; a dedicated worker thread owns the sink and is the only
//! place collector I/O happens. Overload sheds the oldest queued spans,
//! delivery beyond the per-second ceiling is dropped, and a failed delivery
//! trips the availability breaker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::config::TracingConfig;
use crate::error::{TraceError, TraceResult};
use crate::sink::SpanSink;
use crate::span::Span;
use crate::state::TracingState;
use crate::{tracer_debug, tracer_warn};

/// How long flush and shutdown wait for the worker to acknowledge.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

enum ControlMessage {
    ForceFlush(Sender<TraceResult<()>>),
    Shutdown(Sender<TraceResult<()>>),
}

/// Handle to the submission worker. Clones share the worker.
#[derive(Clone)]
pub(crate) struct SubmissionPipeline {
    inner: Arc<PipelineShared>,
}

struct PipelineShared {
    span_tx: Sender<Span>,
    // Kept for shedding: a full queue drops its oldest span, not the new one.
    span_rx: Receiver<Span>,
    control_tx: Sender<ControlMessage>,
    dropped_spans: Arc<AtomicUsize>,
    is_shutdown: AtomicBool,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SubmissionPipeline {
    /// Start the worker thread that owns `sink`.
    pub(crate) fn spawn(
        config: &TracingConfig,
        sink: Box<dyn SpanSink>,
        state: Arc<TracingState>,
    ) -> TraceResult<SubmissionPipeline> {
        let (span_tx, span_rx) = bounded(config.channel_capacity());
        let (control_tx, control_rx) = bounded(4);
        let dropped_spans = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            sink,
            limiter: RateLimiter::new(config.max_spans_per_second),
            state,
            dropped_spans: dropped_spans.clone(),
        };
        let worker_rx = span_rx.clone();
        let handle = thread::Builder::new()
            .name("ZipkinTracer.Submitter".to_string())
            .spawn(move || worker.run(&worker_rx, &control_rx))
            .map_err(|err| TraceError::Other(format!("failed to spawn submission worker: {err}")))?;

        Ok(SubmissionPipeline {
            inner: Arc::new(PipelineShared {
                span_tx,
                span_rx,
                control_tx,
                dropped_spans,
                is_shutdown: AtomicBool::new(false),
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Queue a finalized span without blocking. When the queue is full the
    /// oldest queued span is shed to make room.
    pub(crate) fn submit(&self, span: Span) {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            count_dropped(&self.inner.dropped_spans, 1);
            return;
        }
        match self.inner.span_tx.try_send(span) {
            Ok(()) => {}
            Err(TrySendError::Full(span)) => {
                if self.inner.span_rx.try_recv().is_ok() {
                    count_dropped(&self.inner.dropped_spans, 1);
                }
                if self.inner.span_tx.try_send(span).is_err() {
                    count_dropped(&self.inner.dropped_spans, 1);
                }
            }
            Err(TrySendError::Disconnected(_)) => count_dropped(&self.inner.dropped_spans, 1),
        }
    }

    /// Drain everything queued through the delivery path and wait for the
    /// worker's acknowledgement.
    pub(crate) fn force_flush(&self) -> TraceResult<()> {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (ack_tx, ack_rx) = bounded(1);
        self.inner
            .control_tx
            .try_send(ControlMessage::ForceFlush(ack_tx))
            .map_err(|_| TraceError::Other("failed to reach the submission worker".to_string()))?;
        ack_rx
            .recv_timeout(ACK_TIMEOUT)
            .map_err(|_| TraceError::Timeout(ACK_TIMEOUT))?
    }

    /// Drain the queue, stop the worker and join it. Only the first call
    /// shuts down; later calls return [`TraceError::AlreadyShutdown`].
    pub(crate) fn shutdown(&self) -> TraceResult<()> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let dropped = self.inner.dropped_spans.load(Ordering::Relaxed);
        if dropped > 0 {
            tracer_warn!(name: "SubmissionPipeline.DroppedSpans", total = dropped);
        }
        let (ack_tx, ack_rx) = bounded(1);
        self.inner
            .control_tx
            .try_send(ControlMessage::Shutdown(ack_tx))
            .map_err(|_| TraceError::Other("failed to reach the submission worker".to_string()))?;
        let acked = ack_rx
            .recv_timeout(ACK_TIMEOUT)
            .map_err(|_| TraceError::Timeout(ACK_TIMEOUT))?;
        let mut worker = self.inner.worker.lock()?;
        if let Some(handle) = worker.take() {
            handle
                .join()
                .map_err(|_| TraceError::Other("submission worker panicked".to_string()))?;
        }
        acked
    }

    /// Spans dropped so far: shed under overload, rejected by the rate
    /// limit, discarded during an outage or submitted after shutdown.
    pub(crate) fn dropped_span_count(&self) -> usize {
        self.inner.dropped_spans.load(Ordering::Relaxed)
    }
}

fn count_dropped(counter: &AtomicUsize, count: usize) {
    if counter.fetch_add(count, Ordering::Relaxed) == 0 {
        tracer_warn!(
            name: "SubmissionPipeline.SpanDroppingStarted",
            message = "spans are being dropped; the total is reported at shutdown"
        );
    }
}

struct Worker {
    sink: Box<dyn SpanSink>,
    limiter: RateLimiter,
    state: Arc<TracingState>,
    dropped_spans: Arc<AtomicUsize>,
}

impl Worker {
    fn run(mut self, spans: &Receiver<Span>, control: &Receiver<ControlMessage>) {
        loop {
            crossbeam_channel::select! {
                recv(spans) -> message => match message {
                    Ok(span) => self.deliver(span),
                    Err(_) => break,
                },
                recv(control) -> message => match message {
                    Ok(ControlMessage::ForceFlush(ack)) => {
                        self.drain(spans);
                        let _ = ack.send(Ok(()));
                    }
                    Ok(ControlMessage::Shutdown(ack)) => {
                        self.drain(spans);
                        self.sink.shutdown();
                        let _ = ack.send(Ok(()));
                        break;
                    }
                    Err(_) => break,
                },
            }
        }
    }

    fn drain(&mut self, spans: &Receiver<Span>) {
        while let Ok(span) = spans.try_recv() {
            self.deliver(span);
        }
    }

    fn deliver(&mut self, span: Span) {
        if !self.state.is_enabled() {
            count_dropped(&self.dropped_spans, 1);
            return;
        }
        if !self.limiter.admit(Instant::now()) {
            tracer_debug!(name: "SubmissionPipeline.RateLimited");
            count_dropped(&self.dropped_spans, 1);
            return;
        }
        if let Err(err) = self.sink.submit(vec![span]) {
            self.state.mark_unavailable();
            count_dropped(&self.dropped_spans, 1);
            tracer_warn!(
                name: "SubmissionPipeline.CollectorUnavailable",
                message = "span delivery failed; tracing is disabled until a health probe re-enables it",
                error = format!("{err}")
            );
        }
    }
}

/// Rolling one-second window over delivery admissions.
struct RateLimiter {
    budget: usize,
    window: Duration,
    admissions: VecDeque<Instant>,
}

impl RateLimiter {
    fn new(max_per_second: u64) -> Self {
        RateLimiter {
            budget: usize::try_from(max_per_second).unwrap_or(usize::MAX),
            window: Duration::from_secs(1),
            admissions: VecDeque::new(),
        }
    }

    /// Whether a delivery may happen at `now`; admitted deliveries are
    /// recorded against the window.
    fn admit(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.admissions.front() {
            if now.duration_since(*oldest) >= self.window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
        if self.admissions.len() < self.budget {
            self.admissions.push_back(now);
            true
        } else {
            false
        }
    }
}
