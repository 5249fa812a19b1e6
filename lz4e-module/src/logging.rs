//! Unified logging support for the LZ4E filter
//!
//! Every message goes through the `log` facade under the `lz4e` target and
//! carries the `lz4e: ` prefix, so filter messages can be told apart from
//! those of the device underneath. Installing a logger is left to the host.

#[doc(hidden)]
pub use log as __log;

pub use lz4e_api::LOG_TARGET;

/// Debug-level logging for request lifecycle events
#[macro_export]
macro_rules! lz4e_debug {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logging::__log::debug!(
            target: $crate::logging::LOG_TARGET, concat!("lz4e: ", $fmt) $($arg)*
        )
    }
}

/// Info-level logging
#[macro_export]
macro_rules! lz4e_info {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logging::__log::info!(
            target: $crate::logging::LOG_TARGET, concat!("lz4e: ", $fmt) $($arg)*
        )
    }
}

/// Warn-level logging
#[macro_export]
macro_rules! lz4e_warn {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logging::__log::warn!(
            target: $crate::logging::LOG_TARGET, concat!("lz4e: ", $fmt) $($arg)*
        )
    }
}

/// Error-level logging
#[macro_export]
macro_rules! lz4e_err {
    ($fmt:literal $($arg:tt)*) => {
        $crate::logging::__log::error!(
            target: $crate::logging::LOG_TARGET, concat!("lz4e: ", $fmt) $($arg)*
        )
    }
}
