// crates/playcut-core/src/diagnostics.rs
//
// Environment-gated debug logging, centralized under one feature-flag
// module instead of scattered env var reads. Each flag is read from its
// env var exactly once via OnceLock; the trace_*! macros forward to
// tracing::debug! only when the flag is set, so each call site still pays
// just one atomic load when disabled regardless of the tracing
// subscriber's own filter.

use std::sync::OnceLock;

fn env_flag(var: &str) -> bool {
    std::env::var(var).map(|v| v == "1").unwrap_or(false)
}

pub fn debug_decode_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| env_flag("PLAYBACK_DEBUG_LOGS"))
}

pub fn debug_mapper_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| env_flag("CIN_TIMELINE_DEBUG"))
}

pub fn debug_transport_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| env_flag("CIN_TRANSPORT_TRACE"))
}

#[macro_export]
macro_rules! trace_decode {
    ($($arg:tt)*) => {
        if $crate::diagnostics::debug_decode_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! trace_mapper {
    ($($arg:tt)*) => {
        if $crate::diagnostics::debug_mapper_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! trace_transport {
    ($($arg:tt)*) => {
        if $crate::diagnostics::debug_transport_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}
