//! Native descriptor calls
//!
//! Pass-through for descriptors the registry does not manage, plus the
//! OS-level side of managed ones (socketpair to obtain descriptor numbers,
//! close to release them).

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub(crate) use unix::{close, creat, open, read, read_cond, socketpair, tcdrain, write};
    } else {
        compile_error!("vserial needs a Unix host: descriptors are POSIX file descriptors");
    }
}
