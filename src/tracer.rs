//! The tracing client facade.

use std::error::Error;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::accumulator::{spawn_reaper, ReaperHandle, SpanAccumulator};
use crate::cache::MetadataCache;
use crate::collector::CollectorSink;
use crate::config::{TracingConfig, TracingConfigBuilder};
use crate::error::{TraceError, TraceResult};
use crate::metadata::{CorrelationId, SpanMetadata};
use crate::pipeline::SubmissionPipeline;
use crate::sampler::Sampler;
use crate::sink::{NoopSink, SpanSink};
use crate::span::{AnnotationValue, Span};
use crate::state::TracingState;
use crate::{tracer_debug, tracer_info, tracer_warn};

/// Entry point for all tracing operations.
///
/// A `Tracer` owns the sampling counter, the decision cache, the open-span
/// accumulator and the submission worker. It is cheap to clone; clones
/// share all of that state, so one tracer per process is the intended
/// shape.
///
/// Recording methods never block and never fail: when a unit of work is
/// not sampled, tracing is disabled, or the collector is down, they fall
/// through as no-ops. Only construction, [`force_flush`](Tracer::force_flush)
/// and [`shutdown`](Tracer::shutdown) report errors.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    config: TracingConfig,
    state: Arc<TracingState>,
    cache: Arc<MetadataCache>,
    accumulator: Arc<SpanAccumulator>,
    sampler: Sampler,
    pipeline: SubmissionPipeline,
    reaper: Mutex<Option<ReaperHandle>>,
    is_shutdown: AtomicBool,
}

impl Tracer {
    /// Start building a tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Make the sampling decision for a fresh unit of work.
    ///
    /// Returns the new span's metadata when this unit is admitted, `None`
    /// otherwise. The decision is made at most once per id; later calls
    /// for the same id return `None`.
    pub fn sample(
        &self,
        id: CorrelationId,
        service_name: &str,
        rpc_name: &str,
    ) -> Option<SpanMetadata> {
        self.inner.sampler.decide(id, service_name, rpc_name, false)
    }

    /// Like [`sample`](Tracer::sample), but admits the unit of work
    /// unconditionally without advancing the sampling counter. Useful for
    /// requests that must always be traced, such as debug endpoints.
    pub fn sample_forced(
        &self,
        id: CorrelationId,
        service_name: &str,
        rpc_name: &str,
    ) -> Option<SpanMetadata> {
        self.inner.sampler.decide(id, service_name, rpc_name, true)
    }

    /// Open a child span of an already-sampled unit of work. Returns
    /// `None` when the parent is unknown, meaning it was never sampled.
    pub fn create_child(
        &self,
        child_id: CorrelationId,
        parent_id: CorrelationId,
        service_name: &str,
        rpc_name: &str,
    ) -> Option<SpanMetadata> {
        self.inner
            .sampler
            .create_child(child_id, parent_id, service_name, rpc_name)
    }

    /// Adopt span metadata received from an upstream process, typically
    /// decoded by the [`B3Propagator`](crate::propagation::B3Propagator),
    /// and open a span for it.
    pub fn import_metadata(
        &self,
        id: CorrelationId,
        metadata: SpanMetadata,
        service_name: &str,
        rpc_name: &str,
    ) {
        self.inner.sampler.import(id, metadata, service_name, rpc_name);
    }

    /// Look up the metadata recorded for `id`, for propagation to a
    /// downstream process. `None` when the id was never sampled, the
    /// decision has aged out of the cache, or tracing is disabled.
    pub fn export_metadata(&self, id: CorrelationId) -> Option<SpanMetadata> {
        if !self.inner.state.is_enabled() {
            return None;
        }
        self.inner.cache.get(&id)
    }

    /// Append a timestamped annotation to the span for `id`. A no-op when
    /// the id is unknown, already flushed, or tracing is disabled.
    pub fn record(&self, id: CorrelationId, value: impl Into<String>) {
        self.inner.accumulator.add_annotation(id, value);
    }

    /// Record an error and its chain of sources as one annotation.
    pub fn record_error(&self, id: CorrelationId, error: &dyn Error) {
        let mut value = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(value, "\ncaused by: {cause}");
            source = cause.source();
        }
        self.inner.accumulator.add_annotation(id, value);
    }

    /// Attach a typed key/value fact to the span for `id`. A no-op under
    /// the same conditions as [`record`](Tracer::record).
    pub fn record_value(
        &self,
        id: CorrelationId,
        key: impl Into<String>,
        value: impl Into<AnnotationValue>,
    ) {
        self.inner.accumulator.add_binary_annotation(id, key, value.into());
    }

    /// Finalize the span for `id` and queue it for delivery. Cancels the
    /// pending auto-flush deadline; flushing an unknown id is a no-op.
    pub fn flush(&self, id: CorrelationId) {
        self.inner.accumulator.flush(id, true);
    }

    /// Queue caller-built spans directly, bypassing sampling. Intended for
    /// spans reconstructed from other systems.
    pub fn submit_spans(&self, spans: Vec<Span>) {
        self.inner.accumulator.submit_raw(spans);
    }

    /// Whether tracing currently records anything.
    pub fn is_enabled(&self) -> bool {
        self.inner.state.is_enabled()
    }

    /// Report that a collector health probe succeeded. Re-applies the
    /// configured enabled state after an outage tripped the breaker.
    pub fn mark_collector_available(&self) {
        self.inner.state.mark_available();
        tracer_info!(name: "Tracer.CollectorAvailable");
    }

    /// Report that a collector health probe failed; recording stops until
    /// a later probe succeeds.
    pub fn mark_collector_unavailable(&self) {
        self.inner.state.mark_unavailable();
        tracer_info!(name: "Tracer.CollectorUnavailable");
    }

    /// Spans dropped so far by the delivery side: shed under overload,
    /// rejected by the rate limit or discarded during an outage.
    pub fn dropped_span_count(&self) -> usize {
        self.inner.pipeline.dropped_span_count()
    }

    /// Push everything already queued through the delivery path and wait
    /// for the worker to confirm.
    pub fn force_flush(&self) -> TraceResult<()> {
        self.inner.pipeline.force_flush()
    }

    /// Stop the reaper and the submission worker, delivering whatever is
    /// still queued. The first call wins; later calls (from any clone)
    /// return [`TraceError::AlreadyShutdown`].
    pub fn shutdown(&self) -> TraceResult<()> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        self.inner.shutdown_parts()
    }
}

impl TracerInner {
    fn shutdown_parts(&self) -> TraceResult<()> {
        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(mut handle) = reaper.take() {
                handle.stop();
            }
        }
        self.pipeline.shutdown()
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.inner.config)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Drop for TracerInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::Relaxed) {
            let _ = self.shutdown_parts();
        }
    }
}

/// Builder for [`Tracer`].
///
/// Configuration setters mirror [`TracingConfigBuilder`]; the builder is
/// seeded from the `ZIPKIN_TRACER_*` environment variables.
#[derive(Default)]
pub struct TracerBuilder {
    config: TracingConfigBuilder,
    sink: Option<Box<dyn SpanSink>>,
}

impl TracerBuilder {
    /// Set the collector host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config = self.config.with_host(host);
        self
    }

    /// Set the collector port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.config = self.config.with_port(port);
        self
    }

    /// Record every `sample_rate`-th unit of work.
    pub fn with_sample_rate(mut self, sample_rate: u64) -> Self {
        self.config = self.config.with_sample_rate(sample_rate);
        self
    }

    /// Set whether tracing starts enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.config = self.config.with_enabled(enabled);
        self
    }

    /// Set the per-second delivery ceiling.
    pub fn with_max_spans_per_second(mut self, max_spans_per_second: u64) -> Self {
        self.config = self.config.with_max_spans_per_second(max_spans_per_second);
        self
    }

    /// Set how long spans may stay open before an automatic flush.
    pub fn with_span_ttl(mut self, span_ttl: Duration) -> Self {
        self.config = self.config.with_span_ttl(span_ttl);
        self
    }

    /// Set how long sampling decisions stay cached.
    pub fn with_retention_window(mut self, retention_window: Duration) -> Self {
        self.config = self.config.with_retention_window(retention_window);
        self
    }

    /// Deliver spans to `sink` instead of a Zipkin collector. Used by
    /// tests and custom transports.
    pub fn with_sink<S: SpanSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Validate the configuration and start the tracer, spawning its
    /// submission worker and reaper threads.
    ///
    /// Without a collector host or a custom sink the tracer still builds,
    /// but stays disabled: code can be instrumented unconditionally and
    /// activated purely through configuration.
    pub fn build(self) -> TraceResult<Tracer> {
        let config = self.config.build()?;

        let has_target = config.host.is_some() || self.sink.is_some();
        if config.enabled && !has_target {
            tracer_warn!(
                name: "Tracer.NoCollectorHost",
                message = "no collector host configured; tracing stays disabled"
            );
        }
        let state = Arc::new(TracingState::new(config.enabled && has_target));

        let sink: Box<dyn SpanSink> = match self.sink {
            Some(sink) => sink,
            None => match config.host.as_deref() {
                Some(host) => Box::new(CollectorSink::new(host, config.port)),
                None => Box::new(NoopSink),
            },
        };

        let pipeline = SubmissionPipeline::spawn(&config, sink, state.clone())?;
        let accumulator = Arc::new(SpanAccumulator::new(
            config.span_ttl,
            pipeline.clone(),
            state.clone(),
        ));
        let cache = Arc::new(MetadataCache::new(config.metadata_cache_capacity()));
        let sampler = Sampler::new(
            config.sample_rate,
            state.clone(),
            cache.clone(),
            accumulator.clone(),
        );
        let reaper = spawn_reaper(accumulator.clone())?;

        tracer_debug!(
            name: "Tracer.Started",
            sample_rate = config.sample_rate,
            enabled = state.is_enabled()
        );

        Ok(Tracer {
            inner: Arc::new(TracerInner {
                config,
                state,
                cache,
                accumulator,
                sampler,
                pipeline,
                reaper: Mutex::new(Some(reaper)),
                is_shutdown: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for TracerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}
