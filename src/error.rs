//! Errors surfaced by the tracing client.

use std::sync::PoisonError;
use std::time::Duration;

use thiserror::Error;

/// Result type used throughout the tracing client.
pub type TraceResult<T> = Result<T, TraceError>;

/// Error returned by tracer construction, flushing and shutdown.
///
/// Span-recording calls never return errors; they degrade to no-ops so that
/// instrumented code keeps its shape. Failures on that path are counted and
/// reported through internal logs instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A configuration value was rejected.
    #[error("invalid configuration value for {option}: {reason}")]
    Config {
        /// The offending option.
        option: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Encoding spans or talking to the collector failed.
    #[error("collector transport error: {0}")]
    Transport(#[from] thrift::Error),

    /// The operation was attempted after shutdown completed.
    #[error("tracer already shut down")]
    AlreadyShutdown,

    /// The submission worker did not acknowledge in time.
    #[error("submission worker did not respond within {0:?}")]
    Timeout(Duration),

    /// Other errors propagated from the tracing machinery.
    #[error("{0}")]
    Other(String),
}

impl From<String> for TraceError {
    fn from(message: String) -> Self {
        TraceError::Other(message)
    }
}

impl From<&'static str> for TraceError {
    fn from(message: &'static str) -> Self {
        TraceError::Other(message.to_string())
    }
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string())
    }
}
