// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::sync::{atomic::AtomicBool, atomic::Ordering};

#[doc(hidden)]
pub use log as _log;

#[macro_export]
macro_rules! info {
    ($msg:literal, $($arg:tt)+) => {
        compiler_log::_log::info!(target: concat!("awgseq::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        compiler_log::_log::info!(target: concat!("awgseq::", module_path!()), $msg);
    };
}

#[macro_export]
macro_rules! warn {
    ($msg:literal, $($arg:tt)+) => {
        compiler_log::_log::warn!(target: concat!("awgseq::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        compiler_log::_log::warn!(target: concat!("awgseq::", module_path!()), $msg);
    };
}

/// Log a diagnostic message at debug level if diagnostics logging is enabled.
///
/// Diagnostics cover per-channel library sizes and timing padding decisions,
/// which are too verbose for regular compiles.
#[macro_export]
macro_rules! diagnostic {
    ($msg:literal, $($arg:tt)+) => {
        if compiler_log::is_diagnostics_enabled() {
             compiler_log::_log::debug!(target: concat!("awgseq::", module_path!()), $msg, $($arg)+);
        }
    };
    ($msg:literal) => {
        if compiler_log::is_diagnostics_enabled() {
            compiler_log::_log::debug!(target: concat!("awgseq::", module_path!()), $msg);
        }
    };
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS_ENABLED.load(Ordering::Acquire)
}

/// Initialize the logging.
///
/// Only the diagnostics switch is owned here. The host application installs
/// the concrete `log` backend.
pub fn init_logging(with_diagnostics: bool) {
    DIAGNOSTICS_ENABLED.store(with_diagnostics, Ordering::Release);
}
