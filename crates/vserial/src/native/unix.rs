//! POSIX implementations via libc/nix

use std::ffi::CString;
use std::os::fd::IntoRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::socket::{self, AddressFamily, SockFlag, SockType};
use nix::sys::stat::Mode;

use vserial_core::{DescriptorId, TimeoutPolicy, VsResult};

/// Create an OS socket pair; only its descriptor numbers are used.
pub(crate) fn socketpair() -> VsResult<(DescriptorId, DescriptorId)> {
    let (a, b) = socket::socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::empty(),
    )?;
    Ok((
        DescriptorId::new(a.into_raw_fd()),
        DescriptorId::new(b.into_raw_fd()),
    ))
}

pub(crate) fn close(des: DescriptorId) -> VsResult<()> {
    let ret = unsafe { libc::close(des.as_raw()) };
    Errno::result(ret)?;
    Ok(())
}

pub(crate) fn read(des: DescriptorId, buf: &mut [u8]) -> VsResult<usize> {
    loop {
        let ret = unsafe {
            libc::read(des.as_raw(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };
        match Errno::result(ret) {
            Ok(n) => return Ok(n as usize),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

pub(crate) fn write(des: DescriptorId, data: &[u8]) -> VsResult<usize> {
    loop {
        let ret = unsafe {
            libc::write(des.as_raw(), data.as_ptr() as *const libc::c_void, data.len())
        };
        match Errno::result(ret) {
            Ok(n) => return Ok(n as usize),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Threshold read on a plain descriptor.
///
/// `BlockIndefinitely` keeps reading until `min` bytes or end-of-file,
/// `NoWait` reads only if the descriptor is ready (0 otherwise), timed
/// policies are refused with `EINVAL`.
pub(crate) fn read_cond(
    des: DescriptorId,
    buf: &mut [u8],
    min: usize,
    timeout: TimeoutPolicy,
) -> VsResult<usize> {
    match timeout {
        TimeoutPolicy::NoWait => {
            if readable_now(des)? {
                read(des, buf)
            } else {
                Ok(0)
            }
        }
        TimeoutPolicy::BlockIndefinitely => {
            let mut total = 0;
            while total < buf.len() {
                let n = read(des, &mut buf[total..])?;
                total += n;
                if n == 0 || total >= min {
                    break;
                }
            }
            Ok(total)
        }
        TimeoutPolicy::InterByte(_) | TimeoutPolicy::Deadline(_) => Err(Errno::EINVAL.into()),
    }
}

/// Zero-timeout poll: true if a read would not block (data, EOF or error).
fn readable_now(des: DescriptorId) -> VsResult<bool> {
    let mut pfd = libc::pollfd {
        fd: des.as_raw(),
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        match Errno::result(ret) {
            Ok(0) => return Ok(false),
            Ok(_) if pfd.revents & libc::POLLNVAL != 0 => return Err(Errno::EBADF.into()),
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

pub(crate) fn tcdrain(des: DescriptorId) -> VsResult<()> {
    let ret = unsafe { libc::tcdrain(des.as_raw()) };
    Errno::result(ret)?;
    Ok(())
}

fn c_path(path: &Path) -> VsResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL.into())
}

pub(crate) fn open(path: &Path, flags: OFlag, mode: Mode) -> VsResult<DescriptorId> {
    let path = c_path(path)?;
    let ret = unsafe { libc::open(path.as_ptr(), flags.bits(), mode.bits() as libc::c_uint) };
    Ok(DescriptorId::new(Errno::result(ret)?))
}

pub(crate) fn creat(path: &Path, mode: Mode) -> VsResult<DescriptorId> {
    let path = c_path(path)?;
    let ret = unsafe { libc::creat(path.as_ptr(), mode.bits()) };
    Ok(DescriptorId::new(Errno::result(ret)?))
}
