//! Lock-free single-producer / single-consumer byte ring
//!
//! One thread writes, one thread reads. No internal locking: the two
//! cursors are atomics, the producer publishes `write_pos` with Release
//! after copying bytes in, the consumer publishes `read_pos` with Release
//! after copying bytes out, and each side loads the other's cursor with
//! Acquire.
//!
//! # Layout
//!
//! ```text
//!  read_pos < write_pos           read_pos > write_pos
//!  "eeeeDDDDeeee"                 "DDeeeeeeeeDD"
//!       ^   ^                       ^        ^
//!       r   w                       w        r
//! ```
//!
//! `read_pos == write_pos` means empty. One block is always held back so a
//! full ring is never confused with an empty one.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Fill value written over consumed bytes so stale reads stand out.
pub const STALE_FILL: u8 = 0xFF;

/// Fixed-capacity SPSC byte ring
pub struct RingBuffer {
    buf: Box<[UnsafeCell<u8>]>,
    /// Allocated length (requested size + one reserved block, rounded up)
    size: usize,
    /// Allocation granularity; also the number of slots held back
    block_size: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

// Safety: the producer only touches bytes in [write_pos, read_pos) and the
// consumer only touches [read_pos, write_pos); the cursors hand ownership of
// bytes across with Release/Acquire.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

/// Up to two contiguous regions of the ring, as (offset, len) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Regions {
    first: (usize, usize),
    second: (usize, usize),
}

impl Regions {
    #[inline]
    fn total(&self) -> usize {
        self.first.1 + self.second.1
    }
}

impl RingBuffer {
    /// Create an empty ring with no storage. Call `reserve` before use.
    pub fn empty() -> Self {
        Self {
            buf: Box::new([]),
            size: 0,
            block_size: 1,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Create a ring able to hold at least `n` bytes.
    pub fn with_capacity(n: usize, block_size: usize) -> Self {
        let mut ring = Self::empty();
        ring.reserve(n, block_size);
        ring
    }

    /// Re-provision storage for `n` bytes; existing contents are dropped.
    ///
    /// One extra slot is reserved and the allocation rounded up to a whole
    /// number of blocks, so exactly `capacity() - block_size` bytes fit.
    pub fn reserve(&mut self, n: usize, block_size: usize) {
        let block_size = block_size.max(1);
        self.block_size = block_size;
        self.clear();

        if n == 0 {
            self.buf = Box::new([]);
            self.size = 0;
            return;
        }

        let size = (n + 1).div_ceil(block_size) * block_size;
        self.buf = (0..size).map(|_| UnsafeCell::new(0)).collect();
        self.size = size;
    }

    /// Reset both cursors. Contents become unreachable.
    pub fn clear(&mut self) {
        self.write_pos.store(0, Ordering::Relaxed);
        self.read_pos.store(0, Ordering::Relaxed);
    }

    /// Allocated length in bytes (including the held-back block)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Block size the ring was reserved with
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes available to read (snapshot)
    pub fn num_readable(&self) -> usize {
        let rpos = self.read_pos.load(Ordering::Acquire);
        let wpos = self.write_pos.load(Ordering::Acquire);

        if rpos < wpos {
            wpos - rpos
        } else if rpos > wpos {
            self.size - (rpos - wpos)
        } else {
            0
        }
    }

    /// Bytes that can be written without overwriting unread data (snapshot)
    pub fn num_writable(&self) -> usize {
        let rpos = self.read_pos.load(Ordering::Acquire);
        let wpos = self.write_pos.load(Ordering::Acquire);

        let free = if rpos < wpos {
            self.size - (wpos - rpos)
        } else if rpos > wpos {
            rpos - wpos
        } else {
            self.size
        };

        free.saturating_sub(self.block_size)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos.load(Ordering::Acquire) == self.write_pos.load(Ordering::Acquire)
    }

    // ── Producer side ──

    fn write_regions(&self) -> Regions {
        let wpos = self.write_pos.load(Ordering::Relaxed);
        let rpos = self.read_pos.load(Ordering::Acquire);

        let mut r = if rpos <= wpos {
            Regions {
                first: (wpos, self.size - wpos),
                second: (0, rpos),
            }
        } else {
            Regions {
                first: (wpos, rpos - wpos),
                second: (0, 0),
            }
        };

        // The held-back block comes off whichever region ends at read_pos.
        if r.second.1 != 0 {
            r.second.1 = r.second.1.saturating_sub(self.block_size);
        } else {
            r.first.1 = r.first.1.saturating_sub(self.block_size);
        }
        r
    }

    /// Free space as up to two writable slices, in write order.
    ///
    /// # Safety
    ///
    /// Only the single producer may call this, and the slices must not be
    /// used after the next `commit_write`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn write_slices(&self) -> (&mut [u8], &mut [u8]) {
        let r = self.write_regions();
        (self.slice_mut(r.first), self.slice_mut(r.second))
    }

    /// First writable region only.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_slices`](Self::write_slices).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn write_region(&self) -> &mut [u8] {
        self.slice_mut(self.write_regions().first)
    }

    /// Publish `n` bytes written through `write_slices`.
    pub fn commit_write(&self, n: usize) {
        if n == 0 || self.size == 0 {
            return;
        }
        let wpos = self.write_pos.load(Ordering::Relaxed);
        self.write_pos.store((wpos + n) % self.size, Ordering::Release);
    }

    /// Copy as much of `data` as fits; returns the count copied.
    ///
    /// Never blocks. Anything that does not fit is silently dropped, so size
    /// the ring for the largest burst the reader may leave unconsumed.
    pub fn write(&self, data: &[u8]) -> usize {
        let r = self.write_regions();
        let n = data.len().min(r.total());
        let from_first = n.min(r.first.1);

        // Safety: single producer; regions lie inside free space.
        unsafe {
            self.copy_in(r.first.0, &data[..from_first]);
            if n > from_first {
                self.copy_in(r.second.0, &data[from_first..n]);
            }
        }

        self.commit_write(n);
        n
    }

    // ── Consumer side ──

    fn read_regions(&self) -> Regions {
        let rpos = self.read_pos.load(Ordering::Relaxed);
        let wpos = self.write_pos.load(Ordering::Acquire);

        if rpos < wpos {
            Regions {
                first: (rpos, wpos - rpos),
                second: (0, 0),
            }
        } else if rpos > wpos {
            Regions {
                first: (rpos, self.size - rpos),
                second: (0, wpos),
            }
        } else {
            Regions::default()
        }
    }

    /// Buffered data as up to two slices, oldest first.
    ///
    /// # Safety
    ///
    /// Only the single consumer may call this, and the slices must not be
    /// used after the next `commit_read`.
    pub unsafe fn read_slices(&self) -> (&[u8], &[u8]) {
        let r = self.read_regions();
        (self.slice_mut(r.first), self.slice_mut(r.second))
    }

    /// First readable region only.
    ///
    /// # Safety
    ///
    /// Same contract as [`read_slices`](Self::read_slices).
    pub unsafe fn read_region(&self) -> &[u8] {
        self.slice_mut(self.read_regions().first)
    }

    /// Release `n` bytes consumed through `read_slices`.
    pub fn commit_read(&self, n: usize) {
        if n == 0 || self.size == 0 {
            return;
        }
        let rpos = self.read_pos.load(Ordering::Relaxed);
        self.read_pos.store((rpos + n) % self.size, Ordering::Release);
    }

    /// Copy up to `out.len()` buffered bytes into `out`; returns the count.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let r = self.read_regions();
        let n = out.len().min(r.total());
        let from_first = n.min(r.first.1);

        // Safety: single consumer; regions lie inside buffered data.
        unsafe {
            self.copy_out(r.first.0, &mut out[..from_first]);
            if n > from_first {
                self.copy_out(r.second.0, &mut out[from_first..n]);
            }

            #[cfg(not(feature = "no-stale-fill"))]
            {
                self.fill(r.first.0, from_first);
                if n > from_first {
                    self.fill(r.second.0, n - from_first);
                }
            }
        }

        self.commit_read(n);
        n
    }

    // ── Internal helpers ──

    #[inline(always)]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.buf.as_ptr())
    }

    #[inline(always)]
    unsafe fn slice_mut(&self, (off, len): (usize, usize)) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        debug_assert!(off + len <= self.size);
        core::slice::from_raw_parts_mut(self.base().add(off), len)
    }

    #[inline(always)]
    unsafe fn copy_in(&self, off: usize, src: &[u8]) {
        if !src.is_empty() {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(off), src.len());
        }
    }

    #[inline(always)]
    unsafe fn copy_out(&self, off: usize, dst: &mut [u8]) {
        if !dst.is_empty() {
            core::ptr::copy_nonoverlapping(self.base().add(off), dst.as_mut_ptr(), dst.len());
        }
    }

    #[allow(dead_code)]
    #[inline(always)]
    unsafe fn fill(&self, off: usize, len: usize) {
        if len != 0 {
            core::ptr::write_bytes(self.base().add(off), STALE_FILL, len);
        }
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.size)
            .field("block_size", &self.block_size)
            .field("readable", &self.num_readable())
            .field("writable", &self.num_writable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reserve_adds_one_slot() {
        let ring = RingBuffer::with_capacity(300, 1);
        assert_eq!(ring.capacity(), 301);
        assert_eq!(ring.num_writable(), 300);
        assert_eq!(ring.num_readable(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_reserve_block_alignment() {
        let ring = RingBuffer::with_capacity(10, 4);
        // 10 + 1 rounded up to a multiple of 4
        assert_eq!(ring.capacity(), 12);
        assert_eq!(ring.num_writable(), 8);
    }

    #[test]
    fn test_reserve_zero() {
        let ring = RingBuffer::with_capacity(0, 1);
        assert_eq!(ring.capacity(), 0);
        assert_eq!(ring.write(b"abc"), 0);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn test_fifo_order() {
        let ring = RingBuffer::with_capacity(32, 1);
        assert_eq!(ring.write(b"hello "), 6);
        assert_eq!(ring.write(b"world"), 5);

        let mut out = [0u8; 32];
        let n = ring.read(&mut out);
        assert_eq!(&out[..n], b"hello world");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_write_truncates_when_full() {
        let ring = RingBuffer::with_capacity(4, 1);
        assert_eq!(ring.write(b"abcdef"), 4);
        assert_eq!(ring.num_writable(), 0);
        assert_eq!(ring.write(b"g"), 0);

        let mut out = [0u8; 8];
        let n = ring.read(&mut out);
        assert_eq!(&out[..n], b"abcd");
    }

    #[test]
    fn test_partial_read() {
        let ring = RingBuffer::with_capacity(16, 1);
        ring.write(b"abcde");

        let mut out = [0u8; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(&out, b"abc");
        assert_eq!(ring.num_readable(), 2);
    }

    #[test]
    fn test_wrap_around() {
        let ring = RingBuffer::with_capacity(8, 1);
        let mut out = [0u8; 8];

        // Push the cursors near the end, then write across the seam
        assert_eq!(ring.write(b"123456"), 6);
        assert_eq!(ring.read(&mut out[..6]), 6);
        assert_eq!(ring.write(b"abcdefg"), 7);

        let (a, b) = unsafe { ring.read_slices() };
        assert_eq!(a.len() + b.len(), 7);
        assert!(!b.is_empty());

        let n = ring.read(&mut out);
        assert_eq!(&out[..n], b"abcdefg");
    }

    #[test]
    fn test_capacity_invariant() {
        let ring = RingBuffer::with_capacity(20, 1);
        let mut out = [0u8; 20];
        for step in 0..50usize {
            ring.write(&vec![step as u8; step % 7]);
            assert_eq!(ring.num_readable() + ring.num_writable(), ring.capacity() - 1);
            ring.read(&mut out[..step % 5]);
            assert_eq!(ring.num_readable() + ring.num_writable(), ring.capacity() - 1);
        }
    }

    #[test]
    fn test_read_fills_stale_bytes() {
        let ring = RingBuffer::with_capacity(8, 1);
        ring.write(b"xyz");
        let mut out = [0u8; 3];
        ring.read(&mut out);
        assert_eq!(&out, b"xyz");

        let raw: Vec<u8> = (0..3).map(|i| unsafe { *ring.base().add(i) }).collect();
        if cfg!(not(feature = "no-stale-fill")) {
            assert_eq!(raw, vec![STALE_FILL; 3]);
        }
    }

    #[test]
    fn test_span_write_commit() {
        let ring = RingBuffer::with_capacity(8, 1);
        unsafe {
            let region = ring.write_region();
            region[..4].copy_from_slice(b"span");
        }
        ring.commit_write(4);
        assert_eq!(ring.num_readable(), 4);

        let first = unsafe { ring.read_region() }.to_vec();
        assert_eq!(first, b"span");
        ring.commit_read(4);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::with_capacity(8, 1);
        ring.write(b"abc");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.num_writable(), 8);
    }

    #[test]
    fn test_concurrent_spsc() {
        let ring = Arc::new(RingBuffer::with_capacity(64, 1));
        let total = 20_000usize;

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut sent = 0usize;
                while sent < total {
                    let chunk: Vec<u8> = (sent..(sent + 13).min(total)).map(|i| i as u8).collect();
                    let n = ring.write(&chunk);
                    sent += n;
                    if n == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(total);
        let mut out = [0u8; 17];
        while received.len() < total {
            let n = ring.read(&mut out);
            received.extend_from_slice(&out[..n]);
            if n == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        for (i, b) in received.iter().enumerate() {
            assert_eq!(*b, i as u8, "byte {} out of order", i);
        }
    }
}
