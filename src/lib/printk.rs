//! Kernel logging: a small `printk`-style facility that writes through the
//! serial console. Every line is tagged with the core that emitted it, since
//! this kernel runs on up to 8 cores and interleaved untagged output is
//! useless for debugging.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogFormat {
    Human = 0,
    Json = 1,
}

static LOG_FORMAT: AtomicU8 = AtomicU8::new(LogFormat::Human as u8);

pub fn set_log_format(format: LogFormat) {
    LOG_FORMAT.store(format as u8, Ordering::Relaxed);
}

pub fn log_format() -> LogFormat {
    match LOG_FORMAT.load(Ordering::Relaxed) {
        1 => LogFormat::Json,
        _ => LogFormat::Human,
    }
}

struct SerialWriter;

impl Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::arch::x86_64::serial::serial_write(s.as_bytes());
        Ok(())
    }
}

/// Writes one tagged log line. `core_id` comes from the caller so this
/// module never has to know how core topology is detected.
pub fn log(level: LogLevel, subsystem: &str, core_id: u32, args: fmt::Arguments) {
    if crate::gdb::owns_wire() {
        // The debugger has exclusive use of the wire until it sees `D`.
        return;
    }
    let mut writer = SerialWriter;
    match log_format() {
        LogFormat::Human => {
            let _ = writeln!(writer, "[core {}][{}] {}: {}", core_id, subsystem, level.as_str(), args);
        }
        LogFormat::Json => {
            let _ = write!(
                writer,
                "{{\"core\":{},\"subsystem\":\"{}\",\"level\":\"{}\",\"msg\":\"",
                core_id,
                subsystem,
                level.as_str()
            );
            let _ = write!(writer, "{}", args);
            let _ = writeln!(writer, "\"}}");
        }
    }
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $subsystem:expr, $($arg:tt)*) => {
        $crate::lib::printk::log($level, $subsystem, $crate::arch::x86_64::cpu::core_id(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::klog!($crate::lib::printk::LogLevel::Error, $subsystem, $($arg)*)
    };
}

#[macro_export]
macro_rules! kwarn {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::klog!($crate::lib::printk::LogLevel::Warn, $subsystem, $($arg)*)
    };
}

#[macro_export]
macro_rules! kinfo {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::klog!($crate::lib::printk::LogLevel::Info, $subsystem, $($arg)*)
    };
}

#[macro_export]
macro_rules! kdebug {
    ($subsystem:expr, $($arg:tt)*) => {
        $crate::klog!($crate::lib::printk::LogLevel::Debug, $subsystem, $($arg)*)
    };
}
