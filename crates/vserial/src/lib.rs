//! # vserial - Drain-aware virtual serial line
//!
//! In-process replacement for a serial device: a connected pair of real
//! descriptor numbers whose data never leaves the process, with the two
//! pieces of serial-line behavior that plain pipes lack.
//!
//! - **Drain**: `drain(des)` blocks until the peer has actually consumed
//!   every byte written so far (`tcdrain`)
//! - **Threshold reads**: `read_cond(des, buf, min, ..)` waits for at
//!   least `min` bytes (`VMIN`), returning short only when the peer closes
//! - **Pass-through**: any other descriptor goes straight to the OS, so
//!   code under test can keep calling the same entry points on real files
//!
//! ## Quick Start
//!
//! ```ignore
//! use vserial::{open_pair, read_cond, write, drain, close, TimeoutPolicy};
//!
//! let (host, device) = open_pair()?;
//!
//! let device_side = std::thread::spawn(move || {
//!     let mut frame = [0u8; 4];
//!     read_cond(device, &mut frame, 4, TimeoutPolicy::BlockIndefinitely)
//! });
//!
//! write(host, b"PING")?;
//! drain(host)?;          // returns once the device thread has the frame
//! device_side.join().unwrap()?;
//!
//! close(host)?;
//! close(device)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │   open_pair / read / read_cond / write / drain / close   │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Registry                          │
//! │       fd -> Option<Endpoint>, one mutex, grows only      │
//! └──────────────────────────────────────────────────────────┘
//!              │                               │
//!         managed fd                      plain fd
//!              ▼                               ▼
//!    ┌───────────────────┐           ┌───────────────────┐
//!    │     Endpoint      │           │      native       │
//!    │ ring + backlog +  │           │ read/write/close/ │
//!    │ drain_cv/read_cv  │           │ tcdrain via libc  │
//!    └───────────────────┘           └───────────────────┘
//! ```
//!
//! ## Usage contract
//!
//! At most one reader per descriptor at a time, and no `close` while
//! another call on the same descriptor is in flight. Violations go
//! through the configured [`MisusePolicy`]: abort the process (default)
//! or return [`VsError::PreconditionViolated`].

pub mod endpoint;
pub mod registry;
mod native;

use std::path::Path;

// Re-export core types
pub use vserial_core::{
    DescriptorId,
    Misuse,
    MisusePolicy,
    PipeConfig,
    RingBuffer,
    TimeoutPolicy,
    VsError,
    VsResult,
};

// Re-export kprint macros for debug logging
pub use vserial_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use vserial_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_thread_enabled};

// Re-export env utilities
pub use vserial_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

pub use nix::fcntl::OFlag;
pub use nix::sys::stat::Mode;

pub use endpoint::{Endpoint, EndpointState};
pub use registry::Registry;

/// Create a connected pair on the global registry
pub fn open_pair() -> VsResult<(DescriptorId, DescriptorId)> {
    Registry::global().open_pair()
}

/// Read at least one byte, or 0 at end of stream
pub fn read(des: DescriptorId, buf: &mut [u8]) -> VsResult<usize> {
    Registry::global().read(des, buf)
}

/// Read once at least `min` bytes are available
///
/// See [`Registry::read_cond`].
pub fn read_cond(
    des: DescriptorId,
    buf: &mut [u8],
    min: usize,
    timeout: TimeoutPolicy,
) -> VsResult<usize> {
    Registry::global().read_cond(des, buf, min, timeout)
}

/// Non-blocking enqueue toward the peer
pub fn write(des: DescriptorId, data: &[u8]) -> VsResult<usize> {
    Registry::global().write(des, data)
}

/// Wait until the peer has consumed everything written on `des`
pub fn drain(des: DescriptorId) -> VsResult<()> {
    Registry::global().drain(des)
}

pub fn close(des: DescriptorId) -> VsResult<()> {
    Registry::global().close(des)
}

/// Open a regular file as a pass-through descriptor
pub fn open<P: AsRef<Path>>(path: P, flags: OFlag, mode: Mode) -> VsResult<DescriptorId> {
    Registry::global().open(path, flags, mode)
}

pub fn create<P: AsRef<Path>>(path: P, mode: Mode) -> VsResult<DescriptorId> {
    Registry::global().create(path, mode)
}

/// Register a descriptor obtained elsewhere as a pass-through
pub fn adopt(des: DescriptorId) -> VsResult<()> {
    Registry::global().adopt(des)
}
