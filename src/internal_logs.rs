#![allow(unused_macros)]
//! Internal diagnostics macros.
//!
//! These macros (`tracer_info!`, `tracer_warn!`, `tracer_debug!` and
//! `tracer_error!`) report on the tracing machinery itself: dropped spans,
//! collector failures, invalid configuration. They are not a general-purpose
//! logging facade and never touch the spans being recorded.
//!
//! With the `internal-logs` feature (default) they forward to [`tracing`].
//! When running tests with `--nocapture` they print to stdout, which helps
//! when following the flow of operations through a failing test. With the
//! feature disabled they compile to nothing.

/// Log an informational event from the tracing internals.
///
/// # Fields:
/// - `name`: the operation or action being logged.
/// - Additional optional key-value pairs.
///
/// # Example:
/// ```rust
/// use zipkin_tracer::tracer_info;
/// tracer_info!(name: "tracer_started", service = "checkout");
/// ```
#[macro_export]
macro_rules! tracer_info {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::info!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("tracer_info: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::info!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("tracer_info: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log a warning from the tracing internals.
///
/// # Fields:
/// - `name`: the operation or action being logged.
/// - Additional optional key-value pairs.
///
/// # Example:
/// ```rust
/// use zipkin_tracer::tracer_warn;
/// tracer_warn!(name: "span_dropped", reason = "queue full");
/// ```
#[macro_export]
macro_rules! tracer_warn {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("tracer_warn: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("tracer_warn: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log a debug event from the tracing internals.
///
/// # Fields:
/// - `name`: the operation or action being logged.
/// - Additional optional key-value pairs.
///
/// # Example:
/// ```rust
/// use zipkin_tracer::tracer_debug;
/// tracer_debug!(name: "collector_connected", address = "127.0.0.1:9410");
/// ```
#[macro_export]
macro_rules! tracer_debug {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("tracer_debug: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("tracer_debug: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log an error from the tracing internals.
///
/// # Fields:
/// - `name`: the operation or action being logged.
/// - Additional optional key-value pairs.
///
/// # Example:
/// ```rust
/// use zipkin_tracer::tracer_error;
/// tracer_error!(name: "worker_panicked");
/// ```
#[macro_export]
macro_rules! tracer_error {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("tracer_error: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("tracer_error: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}
