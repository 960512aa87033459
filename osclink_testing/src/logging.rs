//! Shared capture of `log` records.
//!
//! `tracing` events reach `log` through the `log-always` bridge, so one
//! process-wide [`logtest::Logger`] sees everything the client emits. The
//! handle serialises tests that inspect it.

use std::sync::{Mutex, MutexGuard, OnceLock};

use log::Level;
use logtest::Logger;
use rstest::fixture;

/// Exclusive handle to the process-wide [`Logger`].
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the logger, discarding records left by earlier tests.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder panicked while holding the logger.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().expect("logger poisoned");
        while guard.pop().is_some() {}
        Self { guard }
    }

    /// Drain captured records at `level` or more severe, as
    /// `(level, message)` pairs.
    pub fn drain(&mut self, level: Level) -> Vec<(Level, String)> {
        let mut records = Vec::new();
        while let Some(record) = self.guard.pop() {
            if record.level() <= level {
                records.push((record.level(), record.args().to_owned()));
            }
        }
        records
    }

    /// Whether any record at `level` or more severe contains `needle`.
    pub fn contains(&mut self, level: Level, needle: &str) -> bool {
        self.drain(level)
            .iter()
            .any(|(_, message)| message.contains(needle))
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
