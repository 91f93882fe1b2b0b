//! Process-wide tracing availability.

use std::sync::atomic::{AtomicBool, Ordering};

/// Circuit breaker between the producer-facing API and the collector.
///
/// Every recording call reads this flag before doing any work. The
/// submission worker trips it when a delivery fails; only an external
/// health probe restores it, and restoring re-applies the configured
/// default rather than forcing tracing on.
#[derive(Debug)]
pub(crate) struct TracingState {
    enabled: AtomicBool,
    configured_default: bool,
}

impl TracingState {
    pub(crate) fn new(configured_default: bool) -> Self {
        TracingState {
            enabled: AtomicBool::new(configured_default),
            configured_default,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Trip the breaker: stop producing until a probe reports recovery.
    pub(crate) fn mark_unavailable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// A probe confirmed the collector is reachable again.
    pub(crate) fn mark_available(&self) {
        self.enabled.store(self.configured_default, Ordering::Relaxed);
    }
}
