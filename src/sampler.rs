//! Systematic sampling decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::accumulator::SpanAccumulator;
use crate::cache::MetadataCache;
use crate::metadata::{CorrelationId, SpanMetadata};
use crate::state::TracingState;

/// Decides which units of work get a span.
///
/// Local decisions are systematic: a shared counter admits every
/// `sample_rate`-th request, so throughput maps directly onto collector
/// load. Forced requests and imported contexts bypass the counter without
/// advancing it. Whatever the path, the metadata cache arbitrates: the
/// first decision recorded for a correlation id is the only one.
pub(crate) struct Sampler {
    sample_rate: u64,
    counter: AtomicU64,
    state: Arc<TracingState>,
    cache: Arc<MetadataCache>,
    accumulator: Arc<SpanAccumulator>,
}

impl Sampler {
    pub(crate) fn new(
        sample_rate: u64,
        state: Arc<TracingState>,
        cache: Arc<MetadataCache>,
        accumulator: Arc<SpanAccumulator>,
    ) -> Self {
        Sampler {
            sample_rate,
            counter: AtomicU64::new(0),
            state,
            cache,
            accumulator,
        }
    }

    /// Decide whether to trace a fresh unit of work. A positive decision
    /// mints forced root metadata, records it and opens the span; `None`
    /// means the unit goes unrecorded. At most one decision is ever made
    /// per id, repeated calls return `None`.
    pub(crate) fn decide(
        &self,
        id: CorrelationId,
        service_name: &str,
        rpc_name: &str,
        force: bool,
    ) -> Option<SpanMetadata> {
        if !self.state.is_enabled() {
            return None;
        }
        if self.cache.contains(&id) {
            return None;
        }
        if !force && !self.next_in_rate() {
            return None;
        }
        let metadata = SpanMetadata::new_root();
        if !self.cache.put_if_absent(id, metadata) {
            // lost the race against a concurrent decision for this id
            return None;
        }
        self.accumulator
            .open_span(id, metadata, service_name, rpc_name);
        Some(metadata)
    }

    fn next_in_rate(&self) -> bool {
        self.counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
            % self.sample_rate
            == 0
    }

    /// Derive a child of an already-sampled unit of work. Returns `None`
    /// when the parent was never sampled or the child id is already
    /// decided; the child never triggers a fresh sampling evaluation.
    pub(crate) fn create_child(
        &self,
        child_id: CorrelationId,
        parent_id: CorrelationId,
        service_name: &str,
        rpc_name: &str,
    ) -> Option<SpanMetadata> {
        if !self.state.is_enabled() {
            return None;
        }
        let parent = self.cache.get(&parent_id)?;
        let metadata = parent.child_of();
        if !self.cache.put_if_absent(child_id, metadata) {
            return None;
        }
        self.accumulator
            .open_span(child_id, metadata, service_name, rpc_name);
        Some(metadata)
    }

    /// Adopt metadata decoded from an incoming request. The upstream
    /// process already decided to trace, so no sampling evaluation happens
    /// here; an id that is already decided keeps its first metadata.
    pub(crate) fn import(
        &self,
        id: CorrelationId,
        metadata: SpanMetadata,
        service_name: &str,
        rpc_name: &str,
    ) {
        if !self.state.is_enabled() {
            return;
        }
        if self.cache.put_if_absent(id, metadata) {
            self.accumulator
                .open_span(id, metadata, service_name, rpc_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::TracingConfig;
    use crate::metadata::{SpanId, TraceId};
    use crate::pipeline::SubmissionPipeline;
    use crate::sink::InMemorySink;

    struct Harness {
        sampler: Sampler,
        cache: Arc<MetadataCache>,
        accumulator: Arc<SpanAccumulator>,
        state: Arc<TracingState>,
    }

    fn harness(sample_rate: u64) -> Harness {
        let config = TracingConfig {
            host: None,
            port: 9410,
            sample_rate,
            enabled: true,
            max_spans_per_second: 10_000,
            span_ttl: Duration::from_secs(60),
            retention_window: Duration::from_secs(30),
        };
        let state = Arc::new(TracingState::new(true));
        let pipeline =
            SubmissionPipeline::spawn(&config, Box::new(InMemorySink::new()), state.clone())
                .unwrap();
        let accumulator = Arc::new(SpanAccumulator::new(
            config.span_ttl,
            pipeline,
            state.clone(),
        ));
        let cache = Arc::new(MetadataCache::new(config.metadata_cache_capacity()));
        let sampler = Sampler::new(
            config.sample_rate,
            state.clone(),
            cache.clone(),
            accumulator.clone(),
        );
        Harness {
            sampler,
            cache,
            accumulator,
            state,
        }
    }

    fn id(value: u64) -> CorrelationId {
        CorrelationId::from_u64(value)
    }

    #[test]
    fn every_nth_distinct_id_is_sampled() {
        let h = harness(4);
        let decisions: Vec<bool> = (1..=8)
            .map(|n| h.sampler.decide(id(n), "svc", "op", false).is_some())
            .collect();
        assert_eq!(
            decisions,
            [false, false, false, true, false, false, false, true]
        );
        assert_eq!(h.accumulator.open_span_count(), 2);
    }

    #[test]
    fn rate_one_samples_everything() {
        let h = harness(1);
        for n in 1..=5 {
            assert!(h.sampler.decide(id(n), "svc", "op", false).is_some());
        }
    }

    #[test]
    fn sampled_metadata_is_a_forced_root() {
        let h = harness(1);
        let metadata = h.sampler.decide(id(1), "svc", "op", false).unwrap();
        assert!(metadata.is_root());
        assert!(metadata.force_sampling);
        assert_eq!(h.cache.get(&id(1)), Some(metadata));
    }

    #[test]
    fn forced_decisions_do_not_advance_the_counter() {
        let h = harness(4);
        assert!(h.sampler.decide(id(100), "svc", "op", true).is_some());

        // the systematic sequence is undisturbed: 4th non-forced call wins
        let decisions: Vec<bool> = (1..=4)
            .map(|n| h.sampler.decide(id(n), "svc", "op", false).is_some())
            .collect();
        assert_eq!(decisions, [false, false, false, true]);
    }

    #[test]
    fn decisions_are_made_at_most_once_per_id() {
        let h = harness(1);
        assert!(h.sampler.decide(id(7), "svc", "op", false).is_some());
        assert!(h.sampler.decide(id(7), "svc", "op", false).is_none());
        assert!(h.sampler.decide(id(7), "svc", "op", true).is_none());
        assert_eq!(h.accumulator.open_span_count(), 1);
    }

    #[test]
    fn a_skipped_id_can_be_retried_by_force() {
        let h = harness(1000);
        assert!(h.sampler.decide(id(1), "svc", "op", false).is_none());
        // the negative outcome was not a recorded decision
        assert!(h.sampler.decide(id(1), "svc", "op", true).is_some());
    }

    #[test]
    fn child_inherits_the_parent_trace() {
        let h = harness(1);
        let parent = h.sampler.decide(id(1), "svc", "op", false).unwrap();
        let child = h
            .sampler
            .create_child(id(2), id(1), "svc", "child-op")
            .unwrap();

        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_id, Some(parent.span_id));
        assert!(child.force_sampling);
        assert_eq!(h.accumulator.open_span_count(), 2);
        assert_eq!(h.cache.get(&id(2)), Some(child));
    }

    #[test]
    fn child_of_an_unsampled_parent_is_not_created() {
        let h = harness(1000);
        assert!(h.sampler.decide(id(1), "svc", "op", false).is_none());
        assert!(h.sampler.create_child(id(2), id(1), "svc", "child").is_none());
        assert_eq!(h.accumulator.open_span_count(), 0);
    }

    #[test]
    fn child_id_collision_keeps_the_first_decision() {
        let h = harness(1);
        let first = h.sampler.decide(id(2), "svc", "op", false).unwrap();
        h.sampler.decide(id(1), "svc", "op", false).unwrap();
        assert!(h.sampler.create_child(id(2), id(1), "svc", "child").is_none());
        assert_eq!(h.cache.get(&id(2)), Some(first));
    }

    #[test]
    fn import_adopts_upstream_metadata_unconditionally() {
        let h = harness(1000);
        let upstream = SpanMetadata::new(
            TraceId::from_u64(123),
            SpanId::from_u64(456),
            Some(SpanId::from_u64(10)),
            false,
        );
        h.sampler.import(id(1), upstream, "svc", "op");

        assert_eq!(h.cache.get(&id(1)), Some(upstream));
        assert_eq!(h.accumulator.open_span_count(), 1);
    }

    #[test]
    fn import_does_not_replace_an_existing_decision() {
        let h = harness(1);
        let local = h.sampler.decide(id(1), "svc", "op", false).unwrap();
        h.sampler
            .import(id(1), SpanMetadata::new_root(), "svc", "op");
        assert_eq!(h.cache.get(&id(1)), Some(local));
        assert_eq!(h.accumulator.open_span_count(), 1);
    }

    #[test]
    fn disabled_tracing_decides_nothing() {
        let h = harness(1);
        h.state.mark_unavailable();

        assert!(h.sampler.decide(id(1), "svc", "op", false).is_none());
        assert!(h.sampler.decide(id(2), "svc", "op", true).is_none());
        assert!(h.sampler.create_child(id(3), id(1), "svc", "child").is_none());
        h.sampler.import(id(4), SpanMetadata::new_root(), "svc", "op");
        assert!(h.cache.get(&id(4)).is_none());

        // nothing was recorded while disabled; sampling resumes cleanly
        h.state.mark_available();
        assert!(h.sampler.decide(id(5), "svc", "op", false).is_some());
    }
}
