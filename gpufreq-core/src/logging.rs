//! Unified logging support for gpufreq-core
//!
//! These macros forward to the `log` facade when the `log` feature is
//! enabled and compile to nothing otherwise, so call sites need no `#[cfg]`.
//! They are crate-private; the expansion names `log` directly.

/// Unified trace-level logging
macro_rules! gf_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    }
}

/// Unified debug-level logging
macro_rules! gf_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    }
}

/// Unified info-level logging
macro_rules! gf_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::info!($($arg)*);
    }
}

/// Unified warn-level logging
macro_rules! gf_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
    }
}

/// Unified error-level logging
macro_rules! gf_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::error!($($arg)*);
    }
}
