//! Trace, span and correlation identifiers.

use std::cell::RefCell;
use std::fmt;
use std::num::ParseIntError;

use rand::{rngs::SmallRng, Rng, SeedableRng};

thread_local! {
    /// Per-thread source for fresh identifiers.
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

pub(crate) fn random_id() -> u64 {
    CURRENT_RNG.with(|rng| rng.borrow_mut().gen())
}

/// A 64-bit trace identifier, shared by every span in one trace tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u64);

impl TraceId {
    /// Construct a trace id from its raw representation.
    pub const fn from_u64(value: u64) -> Self {
        TraceId(value)
    }

    /// Parse a trace id from unpadded lowercase hex, as carried on the wire.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(TraceId)
    }

    /// The raw 64-bit representation.
    pub const fn to_u64(self) -> u64 {
        self.0
    }

    /// Generate a fresh random trace id.
    pub fn random() -> Self {
        TraceId(random_id())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({:x})", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 64-bit span identifier, unique within its trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Construct a span id from its raw representation.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// Parse a span id from unpadded lowercase hex, as carried on the wire.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// The raw 64-bit representation.
    pub const fn to_u64(self) -> u64 {
        self.0
    }

    /// Generate a fresh random span id.
    pub fn random() -> Self {
        SpanId(random_id())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({:x})", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Process-local identifier linking related tracing calls to one unit of work.
///
/// Sampling is decided once per correlation id; annotations and flushes name
/// the id rather than the span, so callers never hold span state themselves.
/// Correlation ids are opaque, are not required to be globally unique and
/// never leave the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Generate a fresh random correlation id.
    pub fn new() -> Self {
        CorrelationId(random_id())
    }

    /// Wrap an existing identifier, such as a request sequence number.
    pub const fn from_u64(value: u64) -> Self {
        CorrelationId(value)
    }

    /// The raw 64-bit representation.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        CorrelationId(value)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({:x})", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// The identity of a span within a trace tree.
///
/// Metadata is immutable once minted. A positive sampling decision, an
/// imported context and a derived child all produce one `SpanMetadata`, and
/// every annotation recorded under the same correlation id ends up on the
/// span it identifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanMetadata {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// The span's own identifier.
    pub span_id: SpanId,
    /// Identifier of the parent span; `None` for a root span.
    pub parent_id: Option<SpanId>,
    /// When set, descendants and importing processes skip their own sampling
    /// evaluation and record unconditionally.
    pub force_sampling: bool,
}

impl SpanMetadata {
    /// Assemble metadata from its parts.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_id: Option<SpanId>,
        force_sampling: bool,
    ) -> Self {
        SpanMetadata {
            trace_id,
            span_id,
            parent_id,
            force_sampling,
        }
    }

    /// Mint metadata for a new root span. Root spans created by a local
    /// sampling decision always force sampling downstream.
    pub(crate) fn new_root() -> Self {
        SpanMetadata {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_id: None,
            force_sampling: true,
        }
    }

    /// Derive metadata for a child span: same trace, fresh span id, this
    /// span as parent. The forced-sampling flag is inherited.
    pub fn child_of(&self) -> SpanMetadata {
        SpanMetadata {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_id: Some(self.span_id),
            force_sampling: self.force_sampling,
        }
    }

    /// Whether this span is the root of its trace.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_hex() {
        let id = TraceId::from_hex("7b").unwrap();
        assert_eq!(id.to_u64(), 123);
        assert_eq!(format!("{id:x}"), "7b");

        let id = SpanId::from_hex("ffffffffffffffff").unwrap();
        assert_eq!(id.to_u64(), u64::MAX);
        assert_eq!(format!("{id:x}"), "ffffffffffffffff");
    }

    #[test]
    fn hex_parsing_rejects_garbage() {
        assert!(TraceId::from_hex("xyz").is_err());
        assert!(TraceId::from_hex("").is_err());
        assert!(SpanId::from_hex("0x12").is_err());
    }

    #[test]
    fn fresh_ids_differ() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
        assert_ne!(TraceId::random().to_u64(), TraceId::random().to_u64());
    }

    #[test]
    fn root_metadata_forces_sampling() {
        let root = SpanMetadata::new_root();
        assert!(root.is_root());
        assert!(root.force_sampling);
    }

    #[test]
    fn child_links_back_to_parent() {
        let parent = SpanMetadata::new_root();
        let child = parent.child_of();
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_id, Some(parent.span_id));
        assert_ne!(child.span_id, parent.span_id);
        assert!(child.force_sampling);
        assert!(!child.is_root());
    }

    #[test]
    fn child_of_unforced_context_stays_unforced() {
        let imported = SpanMetadata::new(
            TraceId::from_u64(1),
            SpanId::from_u64(2),
            None,
            false,
        );
        assert!(!imported.child_of().force_sampling);
    }
}
