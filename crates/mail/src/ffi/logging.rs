//! FFI logging backend that routes `log` records to a foreign callback
//!
//! Lets Rust logs show up in the host app's logging (os_log, Logcat).

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record};

use super::types::{FfiLogLevel, LogCallback};

static FFI_LOGGER: OnceLock<FfiLogger> = OnceLock::new();

struct FfiLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
    max_level: RwLock<Level>,
}

impl FfiLogger {
    fn max_level(&self) -> Level {
        self.max_level.read().map(|l| *l).unwrap_or(Level::Info)
    }

    fn callback(&self) -> Option<Arc<dyn LogCallback>> {
        self.callback.read().ok().and_then(|cb| cb.clone())
    }
}

impl Log for FfiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Clone the handle so the callback runs without holding the lock
        if let Some(callback) = self.callback() {
            callback.on_log(
                FfiLogLevel::from(record.level()),
                record.target().to_string(),
                record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

fn logger() -> &'static FfiLogger {
    FFI_LOGGER.get_or_init(|| FfiLogger {
        callback: RwLock::new(None),
        max_level: RwLock::new(Level::Info),
    })
}

/// Install the callback logger as the global `log` backend and start
/// forwarding records at or above `max_level`.
///
/// Returns false when another logger (e.g. env_logger in the CLI) was
/// installed first; the callback is stored either way.
#[uniffi::export]
pub fn initialize_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) -> bool {
    let logger = logger();
    if let Ok(mut slot) = logger.callback.write() {
        *slot = Some(Arc::from(callback));
    }
    set_log_level(max_level);

    log::set_logger(logger).is_ok()
}

/// Change the maximum forwarded level
#[uniffi::export]
pub fn set_log_level(max_level: FfiLogLevel) {
    let level = Level::from(max_level);
    if let Ok(mut slot) = logger().max_level.write() {
        *slot = level;
    }
    log::set_max_level(level.to_level_filter());
}

/// Stop forwarding records to the foreign callback
#[uniffi::export]
pub fn clear_log_callback() {
    if let Ok(mut slot) = logger().callback.write() {
        *slot = None;
    }
}
