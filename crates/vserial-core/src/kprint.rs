//! Kernel-style print macros for vserial
//!
//! Peer threads share one stderr; every line is written under the stderr
//! lock so output from the two ends of a pair never interleaves mid-line.
//!
//! # Environment Variables
//!
//! - `VSERIAL_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace or 0..5 (default: warn)
//! - `VSERIAL_FLUSH_EPRINT=1` - Flush stderr after each line
//! - `VSERIAL_LOG_THREAD=1` - Prefix lines with the calling thread's name
//!
//! # Usage
//!
//! ```ignore
//! use vserial_core::{kdebug, kerror};
//!
//! kdebug!("pair ({}, {}) created", a, b);
//! kerror!("descriptor {}: {}", des, misuse);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Numeric level; anything above 5 saturates to `Trace`
    pub fn from_u8(v: u8) -> Self {
        Self::ALL
            .get(v as usize)
            .copied()
            .unwrap_or(LogLevel::Trace)
    }

    /// Accepts a level name (any case) or its digit
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::ALL.get(n as usize).copied();
        }
        Self::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(s))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Bracketed tag printed at the start of each line
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

// Packed logger state: level in the low byte, flags above it.
const LEVEL_MASK: u32 = 0xFF;
const F_INIT: u32 = 1 << 8;
const F_FLUSH: u32 = 1 << 9;
const F_THREAD: u32 = 1 << 10;

static STATE: AtomicU32 = AtomicU32::new(LogLevel::Warn as u32);

#[inline]
fn state() -> u32 {
    let s = STATE.load(Ordering::Relaxed);
    if s & F_INIT != 0 {
        return s;
    }
    init();
    STATE.load(Ordering::Relaxed)
}

fn set_flag(flag: u32, on: bool) {
    init();
    if on {
        STATE.fetch_or(flag, Ordering::Relaxed);
    } else {
        STATE.fetch_and(!flag, Ordering::Relaxed);
    }
}

/// Initialize logging from environment variables
///
/// Runs on first log; call it explicitly for deterministic startup.
pub fn init() {
    if STATE.fetch_or(F_INIT, Ordering::SeqCst) & F_INIT != 0 {
        return;
    }

    let mut flags = 0;
    if crate::env::env_get_bool("VSERIAL_FLUSH_EPRINT", false) {
        flags |= F_FLUSH;
    }
    if crate::env::env_get_bool("VSERIAL_LOG_THREAD", false) {
        flags |= F_THREAD;
    }
    STATE.fetch_or(flags, Ordering::Relaxed);

    if let Ok(val) = std::env::var("VSERIAL_LOG_LEVEL") {
        store_level(LogLevel::parse(&val).unwrap_or(LogLevel::Warn));
    }
}

fn store_level(level: LogLevel) {
    let _ = STATE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |s| {
        Some((s & !LEVEL_MASK) | level as u32)
    });
}

#[inline]
pub fn flush_enabled() -> bool {
    state() & F_FLUSH != 0
}

#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8((state() & LEVEL_MASK) as u8)
}

/// Set log level programmatically (overrides the environment)
pub fn set_log_level(level: LogLevel) {
    init();
    store_level(level);
}

pub fn set_flush_enabled(enabled: bool) {
    set_flag(F_FLUSH, enabled);
}

pub fn set_thread_enabled(enabled: bool) {
    set_flag(F_THREAD, enabled);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

fn emit(prefix: Option<&str>, args: std::fmt::Arguments<'_>) {
    let s = state();
    let mut out = std::io::stderr().lock();
    if let Some(prefix) = prefix {
        let _ = write!(out, "{} ", prefix);
        if s & F_THREAD != 0 {
            let _ = write!(out, "<{}> ", std::thread::current().name().unwrap_or("?"));
        }
    }
    let _ = writeln!(out, "{}", args);
    if s & F_FLUSH != 0 {
        let _ = out.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    emit(None, args);
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if level_enabled(level) {
        emit(Some(level.prefix()), args);
    }
}

// ============================================================================
// Public Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::$level, format_args!($($arg)*))
    };
}

/// Print a line to stderr under the stderr lock
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_kprintln_impl(format_args!(""))
    };
    ($($arg:tt)*) => {
        $crate::kprint::_kprintln_impl(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Trace level (read claims, wakes, drain waits)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}
