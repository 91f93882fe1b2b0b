//! Tracer configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{TraceError, TraceResult};
use crate::tracer_warn;

/// Collector host, e.g. `zipkin.internal`. Unset means tracing stays off.
const ZIPKIN_TRACER_HOST: &str = "ZIPKIN_TRACER_HOST";
/// Collector port.
const ZIPKIN_TRACER_PORT: &str = "ZIPKIN_TRACER_PORT";
/// Sampling rate: record every Nth unit of work.
const ZIPKIN_TRACER_SAMPLE_RATE: &str = "ZIPKIN_TRACER_SAMPLE_RATE";
/// Whether tracing starts enabled, `true` or `false`.
const ZIPKIN_TRACER_ENABLED: &str = "ZIPKIN_TRACER_ENABLED";
/// Ceiling on spans delivered to the collector per second.
const ZIPKIN_TRACER_MAX_SPANS_PER_SECOND: &str = "ZIPKIN_TRACER_MAX_SPANS_PER_SECOND";

const DEFAULT_PORT: u16 = 9410;
const DEFAULT_SAMPLE_RATE: u64 = 1;
const DEFAULT_MAX_SPANS_PER_SECOND: u64 = 10_000;
const DEFAULT_SPAN_TTL: Duration = Duration::from_secs(60);
const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(30);

/// Largest span queue the submitter will preallocate.
const MAX_CHANNEL_CAPACITY: u64 = 65_536;

/// Settings for a [`Tracer`](crate::Tracer).
///
/// Built through [`TracingConfig::builder`], which seeds itself from the
/// `ZIPKIN_TRACER_*` environment variables before programmatic overrides
/// apply.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Collector host. `None` leaves the tracer without a delivery target,
    /// which keeps tracing disabled unless a custom sink is supplied.
    pub host: Option<String>,
    /// Collector port.
    pub port: u16,
    /// Record every `sample_rate`-th unit of work; `1` records everything.
    pub sample_rate: u64,
    /// Whether tracing starts enabled. Also the value a collector health
    /// probe restores after an outage.
    pub enabled: bool,
    /// Ceiling on spans delivered to the collector per second; deliveries
    /// beyond it are dropped, never queued.
    pub max_spans_per_second: u64,
    /// How long a span may stay open before it is flushed automatically.
    pub span_ttl: Duration,
    /// How long sampling decisions stay cached for late annotations and
    /// child derivation. Together with `max_spans_per_second` this bounds
    /// the decision cache.
    pub retention_window: Duration,
}

impl TracingConfig {
    /// Start building a configuration.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Upper bound on cached sampling decisions: enough to cover the
    /// retention window at the configured maximum throughput.
    pub(crate) fn metadata_cache_capacity(&self) -> usize {
        let capacity = self
            .max_spans_per_second
            .saturating_mul(self.retention_window.as_secs().max(1));
        usize::try_from(capacity).unwrap_or(usize::MAX)
    }

    /// Capacity of the queue feeding the submission worker. Clamped so a
    /// large rate limit cannot translate into an outsized preallocation.
    pub(crate) fn channel_capacity(&self) -> usize {
        let capacity = self.max_spans_per_second.min(MAX_CHANNEL_CAPACITY);
        usize::try_from(capacity).unwrap_or(usize::MAX).max(1)
    }
}

/// Builder for [`TracingConfig`].
#[derive(Clone, Debug)]
pub struct TracingConfigBuilder {
    host: Option<String>,
    port: u16,
    sample_rate: u64,
    enabled: bool,
    max_spans_per_second: u64,
    span_ttl: Duration,
    retention_window: Duration,
}

impl Default for TracingConfigBuilder {
    /// Built-in defaults, overridden by any `ZIPKIN_TRACER_*` environment
    /// variables that are set. Values that fail to parse are logged and
    /// ignored.
    fn default() -> Self {
        TracingConfigBuilder {
            host: None,
            port: DEFAULT_PORT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            enabled: true,
            max_spans_per_second: DEFAULT_MAX_SPANS_PER_SECOND,
            span_ttl: DEFAULT_SPAN_TTL,
            retention_window: DEFAULT_RETENTION_WINDOW,
        }
        .init_from_env_vars()
    }
}

fn env_override<T: FromStr>(variable: &'static str) -> Option<T> {
    let raw = env::var(variable).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracer_warn!(
                name: "TracingConfig.InvalidEnvValue",
                variable = variable,
                value = raw
            );
            None
        }
    }
}

impl TracingConfigBuilder {
    fn init_from_env_vars(mut self) -> Self {
        if let Ok(host) = env::var(ZIPKIN_TRACER_HOST) {
            if !host.is_empty() {
                self.host = Some(host);
            }
        }
        if let Some(port) = env_override(ZIPKIN_TRACER_PORT) {
            self.port = port;
        }
        if let Some(sample_rate) = env_override(ZIPKIN_TRACER_SAMPLE_RATE) {
            self.sample_rate = sample_rate;
        }
        if let Some(enabled) = env_override(ZIPKIN_TRACER_ENABLED) {
            self.enabled = enabled;
        }
        if let Some(max_spans_per_second) = env_override(ZIPKIN_TRACER_MAX_SPANS_PER_SECOND) {
            self.max_spans_per_second = max_spans_per_second;
        }
        self
    }

    /// Set the collector host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the collector port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Record every `sample_rate`-th unit of work. Must be positive.
    pub fn with_sample_rate(mut self, sample_rate: u64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set whether tracing starts enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-second delivery ceiling. Must be positive.
    pub fn with_max_spans_per_second(mut self, max_spans_per_second: u64) -> Self {
        self.max_spans_per_second = max_spans_per_second;
        self
    }

    /// Set how long spans may stay open before an automatic flush.
    pub fn with_span_ttl(mut self, span_ttl: Duration) -> Self {
        self.span_ttl = span_ttl;
        self
    }

    /// Set how long sampling decisions stay cached.
    pub fn with_retention_window(mut self, retention_window: Duration) -> Self {
        self.retention_window = retention_window;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> TraceResult<TracingConfig> {
        if self.sample_rate == 0 {
            return Err(TraceError::Config {
                option: "sample-rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_spans_per_second == 0 {
            return Err(TraceError::Config {
                option: "max-spans-per-second",
                reason: "must be positive".to_string(),
            });
        }
        Ok(TracingConfig {
            host: self.host,
            port: self.port,
            sample_rate: self.sample_rate,
            enabled: self.enabled,
            max_spans_per_second: self.max_spans_per_second,
            span_ttl: self.span_ttl,
            retention_window: self.retention_window,
        })
    }
}
