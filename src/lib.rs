//! # Zipkin Tracer
//!
//! A distributed-tracing client that samples units of work systematically,
//! accumulates timeline annotations against process-local correlation ids
//! and reports finished spans to a Zipkin-compatible collector over framed
//! binary Thrift.
//!
//! Recording is fire-and-forget: every producer-facing call is non-blocking
//! and degrades to a no-op when a unit of work is unsampled, tracing is
//! disabled, or the collector is unavailable. Instrumented code never has
//! to care whether tracing is on.
//!
//! ## Quickstart
//!
//! The tracer speaks the Zipkin v1 Thrift protocol. Zipkin itself accepts
//! it through the Scribe collector module:
//!
//! ```shell
//! docker run -d -e SCRIBE_ENABLED=true -p 9410:9410 -p 9411:9411 openzipkin/zipkin
//! ```
//!
//! Then sample, annotate and flush against correlation ids:
//!
//! ```no_run
//! use zipkin_tracer::{CorrelationId, Tracer, SERVER_RECV, SERVER_SEND};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracer = Tracer::builder()
//!         .with_host("127.0.0.1")
//!         .with_sample_rate(1)
//!         .build()?;
//!
//!     let id = CorrelationId::new();
//!     if tracer.sample(id, "checkout", "POST /charge").is_some() {
//!         tracer.record(id, SERVER_RECV);
//!         tracer.record_value(id, "http.status_code", 200i32);
//!         tracer.record(id, SERVER_SEND);
//!     }
//!     tracer.flush(id);
//!
//!     tracer.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Sampling model
//!
//! Sampling is systematic rather than probabilistic: with a sample rate of
//! `N`, every `N`-th unit of work is recorded, so collector load is a
//! predictable fraction of traffic. A decision is made at most once per
//! correlation id and cached; children and imported contexts reuse the
//! cached decision instead of rolling their own. Locally sampled roots are
//! marked as forced so every downstream service records the same trace
//! end to end.
//!
//! ## Propagation
//!
//! Trace context crosses process boundaries through the `X-B3-*` header
//! family; see [`propagation`] for the codec and carrier traits.
//!
//! ## Configuration
//!
//! [`Tracer::builder`] seeds itself from environment variables before
//! programmatic overrides apply:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `ZIPKIN_TRACER_HOST` | collector host | unset (tracing disabled) |
//! | `ZIPKIN_TRACER_PORT` | collector port | `9410` |
//! | `ZIPKIN_TRACER_SAMPLE_RATE` | record every Nth unit of work | `1` |
//! | `ZIPKIN_TRACER_ENABLED` | start enabled | `true` |
//! | `ZIPKIN_TRACER_MAX_SPANS_PER_SECOND` | delivery ceiling | `10000` |
//!
//! ## Feature flags
//!
//! - `internal-logs` (default): diagnostics from the tracing machinery
//!   itself, emitted through the `tracing` crate.
//! - `testing`: exposes [`InMemorySink`] so applications can assert on
//!   finished spans in their own tests.
#![deny(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(test, deny(warnings))]

mod accumulator;
mod cache;
mod collector;
mod config;
mod error;
mod internal_logs;
mod metadata;
mod model;
mod pipeline;
pub mod propagation;
mod sampler;
mod sink;
mod span;
mod state;
mod tracer;

pub use collector::CollectorSink;
pub use config::{TracingConfig, TracingConfigBuilder};
pub use error::{TraceError, TraceResult};
pub use metadata::{CorrelationId, SpanId, SpanMetadata, TraceId};
#[cfg(any(feature = "testing", test))]
pub use sink::InMemorySink;
pub use sink::SpanSink;
pub use span::{
    Annotation, AnnotationValue, BinaryAnnotation, Span, CLIENT_RECV, CLIENT_SEND, SERVER_RECV,
    SERVER_SEND,
};
pub use tracer::{Tracer, TracerBuilder};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    //! Implementation detail of the `tracer_*!` logging macros.
    pub use tracing::{debug, error, info, warn};
}
