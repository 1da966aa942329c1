//! Context-level log sink.
//!
//! Internal diagnostics always go through `tracing`; in addition, a client
//! carries an optional log callback and an opt-in stderr sink, both gated by
//! a level bitmask, so embedding applications can route the client's log
//! stream without installing a tracing subscriber.

use bitflags::bitflags;
use tracing::{debug, error, info};

bitflags! {
    /// Log level bitmask; bits are AND-tested against each emitted message
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogLevel: u16 {
        /// Informational messages
        const INFO = 1 << 0;
        /// Errors
        const ERROR = 1 << 1;
        /// Wire-level debugging
        const DEBUG = 1 << 2;
    }
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        if self.contains(LogLevel::ERROR) {
            "err"
        } else if self.contains(LogLevel::DEBUG) {
            "dbg"
        } else {
            "inf"
        }
    }
}

/// Callback receiving each enabled log message
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Per-client log sink state
pub(crate) struct Logger {
    pub(crate) level: LogLevel,
    pub(crate) to_stderr: bool,
    pub(crate) callback: Option<LogCallback>,
}

impl Logger {
    pub(crate) fn new() -> Self {
        Self {
            level: LogLevel::ERROR,
            to_stderr: false,
            callback: None,
        }
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        if level == LogLevel::ERROR {
            error!("{message}");
        } else if level == LogLevel::DEBUG {
            debug!("{message}");
        } else {
            info!("{message}");
        }

        if self.level.contains(level) {
            if let Some(callback) = &self.callback {
                callback(level, message);
            }
            if self.to_stderr {
                eprintln!("[{}] {}", level.prefix(), message);
            }
        }
    }

    pub(crate) fn info(&self, message: &str) {
        self.log(LogLevel::INFO, message);
    }

    pub(crate) fn error(&self, message: &str) {
        self.log(LogLevel::ERROR, message);
    }

    pub(crate) fn debug(&self, message: &str) {
        self.log(LogLevel::DEBUG, message);
    }
}
