//! Structured logging over the serial console.
//!
//! Mirrors the original kernel's `kernel::log_level` / `ktrace`/`kdebug`/
//! `kinfo`/`kwarn`/`kerror` call sites, but routes formatted output through
//! a `spin::Mutex`-guarded [`core::fmt::Write`] sink instead of a bespoke
//! `ostream` hierarchy, and colors each level the way a terminal-facing
//! kernel log typically does.

use core::fmt;

use spin::Mutex;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace = 1,
    Debug = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
}

impl Level {
    fn ansi_color(self) -> &'static str {
        match self {
            Level::Trace => "\x1b[90m",
            Level::Debug => "\x1b[36m",
            Level::Info => "\x1b[32m",
            Level::Warn => "\x1b[33m",
            Level::Error => "\x1b[31m",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Anything a log record's formatted bytes can be written to.
pub trait LogSink: fmt::Write + Send {}
impl<T: fmt::Write + Send> LogSink for T {}

static SINK: Mutex<Option<&'static mut dyn LogSink>> = Mutex::new(None);

/// Installs the sink every `kinfo!`/`kerror!`/... call writes through.
///
/// Call once during early boot, before any logging macro runs from an
/// interrupt handler.
pub fn set_sink(sink: &'static mut dyn LogSink) {
    *SINK.lock() = Some(sink);
}

#[doc(hidden)]
pub fn _log(level: Level, file: &str, line: u32, args: fmt::Arguments<'_>) {
    if level < crate::config::MINIMUM_LOG_LEVEL {
        return;
    }
    use fmt::Write;
    let mut guard = SINK.lock();
    if let Some(sink) = guard.as_mut() {
        let _ = write!(
            sink,
            "{}[{}]\x1b[0m ({}:{}): {}\r\n",
            level.ansi_color(),
            level.label(),
            file,
            line,
            args
        );
    }
}

/// Logs a `Trace`-level record.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {
        $crate::log::_log($crate::log::Level::Trace, file!(), line!(), format_args!($($arg)*))
    };
}

/// Logs a `Debug`-level record.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::log::_log($crate::log::Level::Debug, file!(), line!(), format_args!($($arg)*))
    };
}

/// Logs an `Info`-level record.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::log::_log($crate::log::Level::Info, file!(), line!(), format_args!($($arg)*))
    };
}

/// Logs a `Warn`-level record.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::log::_log($crate::log::Level::Warn, file!(), line!(), format_args!($($arg)*))
    };
}

/// Logs an `Error`-level record.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::log::_log($crate::log::Level::Error, file!(), line!(), format_args!($($arg)*))
    };
}
