//! End-to-end lifecycle tests: sampling, annotation, propagation and
//! delivery through an in-memory sink.
//!
//! Run with: cargo test --test trace_flow --features testing
#![cfg(feature = "testing")]

use std::collections::HashMap;
use std::time::Duration;

use zipkin_tracer::propagation::B3Propagator;
use zipkin_tracer::{
    CorrelationId, InMemorySink, Span, SpanId, SpanMetadata, SpanSink, TraceError, TraceId,
    TraceResult, Tracer, SERVER_RECV, SERVER_SEND,
};

fn build_tracer(sink: &InMemorySink) -> Tracer {
    Tracer::builder()
        .with_enabled(true)
        .with_sample_rate(1)
        .with_max_spans_per_second(10_000)
        .with_sink(sink.clone())
        .build()
        .expect("tracer builds")
}

#[test]
fn span_lifecycle_reaches_the_sink() {
    let sink = InMemorySink::new();
    let tracer = build_tracer(&sink);
    let id = CorrelationId::new();

    let metadata = tracer.sample(id, "checkout", "POST /charge").expect("sampled");
    tracer.record(id, SERVER_RECV);
    tracer.record_value(id, "http.status_code", 200i32);
    tracer.record(id, SERVER_SEND);
    tracer.flush(id);
    tracer.force_flush().expect("flushed");

    let spans = sink.get_finished_spans().expect("spans");
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.service_name, "checkout");
    assert_eq!(span.rpc_name, "POST /charge");
    assert_eq!(span.metadata.trace_id, metadata.trace_id);
    assert_eq!(span.metadata.span_id, metadata.span_id);
    assert!(span.metadata.force_sampling);
    assert_eq!(span.annotations.len(), 2);
    assert_eq!(span.annotations[0].value, "sr");
    assert_eq!(span.annotations[1].value, "ss");
    assert_eq!(span.binary_annotations[0].key, "http.status_code");
    assert!(span.end_time.is_some());

    tracer.shutdown().expect("clean shutdown");
}

#[test]
fn sample_rate_thins_the_stream() {
    let sink = InMemorySink::new();
    let tracer = Tracer::builder()
        .with_enabled(true)
        .with_sample_rate(10)
        .with_max_spans_per_second(10_000)
        .with_sink(sink.clone())
        .build()
        .expect("tracer builds");

    let mut sampled = 0;
    for _ in 0..100 {
        let id = CorrelationId::new();
        if tracer.sample(id, "svc", "op").is_some() {
            sampled += 1;
            tracer.flush(id);
        }
    }
    tracer.force_flush().expect("flushed");

    assert_eq!(sampled, 10);
    assert_eq!(sink.get_finished_spans().expect("spans").len(), 10);
}

#[test]
fn trace_context_crosses_a_process_boundary() {
    let propagator = B3Propagator::new();

    // service A samples a root and derives a child for the outgoing call
    let sink_a = InMemorySink::new();
    let tracer_a = build_tracer(&sink_a);
    let root_id = CorrelationId::new();
    let root = tracer_a.sample(root_id, "frontend", "GET /cart").expect("sampled");

    let call_id = CorrelationId::new();
    tracer_a
        .create_child(call_id, root_id, "frontend", "call inventory")
        .expect("child created");
    let call_metadata = tracer_a.export_metadata(call_id).expect("exported");

    let mut headers: HashMap<String, String> = HashMap::new();
    propagator.inject(&call_metadata, &mut headers);

    // service B picks the context up and records its own span
    let sink_b = InMemorySink::new();
    let tracer_b = build_tracer(&sink_b);
    let serve_id = CorrelationId::new();
    let imported = propagator
        .extract(&headers)
        .expect("well-formed headers")
        .expect("context present");
    tracer_b.import_metadata(serve_id, imported, "inventory", "GET /stock");
    tracer_b.flush(serve_id);
    tracer_b.force_flush().expect("flushed");

    let spans_b = sink_b.get_finished_spans().expect("spans");
    assert_eq!(spans_b.len(), 1);
    assert_eq!(spans_b[0].metadata.trace_id, root.trace_id);
    assert_eq!(spans_b[0].metadata.span_id, call_metadata.span_id);
    assert_eq!(spans_b[0].metadata.parent_id, Some(root.span_id));
    assert!(spans_b[0].metadata.force_sampling);

    tracer_a.flush(root_id);
    tracer_a.flush(call_id);
    tracer_a.force_flush().expect("flushed");
    assert_eq!(sink_a.get_finished_spans().expect("spans").len(), 2);
}

#[test]
fn disabled_tracer_records_nothing() {
    let sink = InMemorySink::new();
    let tracer = Tracer::builder()
        .with_enabled(false)
        .with_sink(sink.clone())
        .build()
        .expect("tracer builds");
    let id = CorrelationId::new();

    assert!(!tracer.is_enabled());
    assert!(tracer.sample(id, "svc", "op").is_none());
    tracer.record(id, "ignored");
    tracer.flush(id);
    tracer.force_flush().expect("flush still works");

    assert!(sink.get_finished_spans().expect("spans").is_empty());
}

#[test]
fn collector_outage_trips_and_a_probe_restores() {
    struct FlakySink {
        inner: InMemorySink,
        fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl SpanSink for FlakySink {
        fn submit(&mut self, batch: Vec<Span>) -> TraceResult<()> {
            if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(TraceError::Other("collector down".to_string()));
            }
            self.inner.submit(batch)
        }
    }

    let delivered = InMemorySink::new();
    let fail = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let sink = FlakySink {
        inner: delivered.clone(),
        fail: fail.clone(),
    };
    let tracer = Tracer::builder()
        .with_enabled(true)
        .with_sample_rate(1)
        .with_max_spans_per_second(10_000)
        .with_sink(sink)
        .build()
        .expect("tracer builds");

    // healthy delivery first
    let id = CorrelationId::new();
    tracer.sample(id, "svc", "op").expect("sampled");
    tracer.flush(id);
    tracer.force_flush().expect("flushed");
    assert_eq!(delivered.get_finished_spans().expect("spans").len(), 1);

    // the collector goes down: the next delivery trips the breaker
    fail.store(true, std::sync::atomic::Ordering::Relaxed);
    let id = CorrelationId::new();
    tracer.sample(id, "svc", "op").expect("sampled");
    tracer.flush(id);
    tracer.force_flush().expect("flushed");
    assert!(!tracer.is_enabled());
    assert_eq!(tracer.dropped_span_count(), 1);

    // while tripped, nothing is even sampled
    assert!(tracer.sample(CorrelationId::new(), "svc", "op").is_none());

    // a health probe restores the configured state
    fail.store(false, std::sync::atomic::Ordering::Relaxed);
    tracer.mark_collector_available();
    assert!(tracer.is_enabled());

    let id = CorrelationId::new();
    tracer.sample(id, "svc", "op").expect("sampled");
    tracer.flush(id);
    tracer.force_flush().expect("flushed");
    assert_eq!(delivered.get_finished_spans().expect("spans").len(), 2);
}

#[test]
fn raw_spans_skip_sampling_entirely() {
    let sink = InMemorySink::new();
    let tracer = build_tracer(&sink);

    let root = SpanMetadata::new(TraceId::random(), SpanId::random(), None, true);
    tracer.submit_spans(vec![
        Span::new(root.child_of(), "bridge", "replayed-op"),
        Span::new(root, "bridge", "other-op"),
    ]);
    tracer.force_flush().expect("flushed");

    let spans = sink.get_finished_spans().expect("spans");
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].rpc_name, "replayed-op");
}

#[test]
fn abandoned_spans_are_flushed_by_the_reaper() {
    let sink = InMemorySink::new();
    let tracer = Tracer::builder()
        .with_enabled(true)
        .with_sample_rate(1)
        .with_max_spans_per_second(10_000)
        .with_span_ttl(Duration::from_millis(50))
        .with_sink(sink.clone())
        .build()
        .expect("tracer builds");

    let id = CorrelationId::new();
    tracer.sample(id, "svc", "abandoned").expect("sampled");
    tracer.record(id, "started");
    // never flushed explicitly

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        tracer.force_flush().expect("flushed");
        let spans = sink.get_finished_spans().expect("spans");
        if !spans.is_empty() {
            assert_eq!(spans[0].rpc_name, "abandoned");
            assert!(spans[0].end_time.is_some());
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "reaper never flushed the abandoned span"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn late_annotations_after_flush_are_lost() {
    let sink = InMemorySink::new();
    let tracer = build_tracer(&sink);
    let id = CorrelationId::new();

    tracer.sample(id, "svc", "op").expect("sampled");
    tracer.record(id, "kept");
    tracer.flush(id);
    tracer.record(id, "lost");
    tracer.force_flush().expect("flushed");

    let spans = sink.get_finished_spans().expect("spans");
    assert_eq!(spans[0].annotations.len(), 1);
    assert_eq!(spans[0].annotations[0].value, "kept");
}

#[test]
fn shutdown_delivers_queued_spans_first() {
    let sink = InMemorySink::new();
    let tracer = build_tracer(&sink);

    for n in 0..5 {
        let id = CorrelationId::new();
        tracer.sample(id, "svc", &format!("op-{n}")).expect("sampled");
        tracer.flush(id);
    }
    tracer.shutdown().expect("clean shutdown");

    assert_eq!(sink.get_finished_spans().expect("spans").len(), 5);
    assert!(matches!(
        tracer.force_flush(),
        Err(TraceError::AlreadyShutdown)
    ));
}
