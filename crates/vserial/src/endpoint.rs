//! Per-descriptor synchronization state
//!
//! Each managed descriptor owns one `Endpoint`: the ring its peer writes
//! into, a signed backlog, and two condition variables.
//!
//! # Backlog
//!
//! ```text
//!   backlog > 0   bytes buffered here, unread      -> drainers wait
//!   backlog == 0  nothing buffered, no claim       -> drain satisfied
//!   backlog < 0   a reader claimed `min` bytes and is still short by -backlog
//! ```
//!
//! `drain_cv` is signalled whenever bytes are consumed or the backlog
//! drops to <= 0. A drain waits only for the bytes enqueued before it
//! started; later writes do not extend it.
//! `read_cv` is signalled whenever it rises to >= 0 or the peer closes.
//!
//! Writes land in the *peer's* endpoint, so the writer of descriptor A
//! drains on B's state and the reader of B reads from B's state.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use vserial_core::{
    ktrace, DescriptorId, Misuse, PipeConfig, RingBuffer, TimeoutPolicy, VsResult,
};

/// Fields guarded by the endpoint mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointState {
    /// Signed backlog, see module docs
    pub backlog: isize,
    /// Other end of the pair, or `DescriptorId::CLOSED` once it has closed
    pub peer: DescriptorId,
    /// Total bytes ever enqueued here
    pub enqueued: u64,
    /// This endpoint itself has been closed
    pub closed: bool,
}

impl EndpointState {
    /// Bytes enqueued so far that have been read or claimed by a reader
    #[inline]
    pub fn retired(&self) -> u64 {
        self.enqueued.saturating_sub(self.backlog.max(0) as u64)
    }
}

/// One end of a managed pair
pub struct Endpoint {
    des: DescriptorId,
    ring: RingBuffer,
    state: Mutex<EndpointState>,
    drain_cv: Condvar,
    read_cv: Condvar,
}

impl Endpoint {
    pub fn new(des: DescriptorId, peer: DescriptorId, config: &PipeConfig) -> Self {
        Self {
            des,
            ring: RingBuffer::with_capacity(config.buffer_size, config.block_size),
            state: Mutex::new(EndpointState {
                backlog: 0,
                peer,
                enqueued: 0,
                closed: false,
            }),
            drain_cv: Condvar::new(),
            read_cv: Condvar::new(),
        }
    }

    #[inline]
    pub fn des(&self) -> DescriptorId {
        self.des
    }

    /// Snapshot of the guarded state
    pub fn snapshot(&self) -> EndpointState {
        *self.lock()
    }

    pub fn peer(&self) -> DescriptorId {
        self.lock().peer
    }

    pub fn backlog(&self) -> isize {
        self.lock().backlog
    }

    /// Bytes physically sitting in the ring
    pub fn buffered(&self) -> usize {
        self.ring.num_readable()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes written by the peer. Never blocks.
    ///
    /// `registry` is released once this endpoint's lock is held, so the
    /// endpoint cannot be closed between lookup and enqueue.
    pub fn write<G>(&self, registry: G, data: &[u8]) -> usize {
        let mut st = self.lock();
        drop(registry);

        let written = self.ring.write(data);
        st.backlog += written as isize;
        st.enqueued += written as u64;
        if st.backlog >= 0 {
            self.read_cv.notify_one();
        }
        ktrace!("des {}: +{} bytes, backlog {}", self.des, written, st.backlog);
        written
    }

    /// Block until everything written here so far has been consumed.
    ///
    /// Returns early if this endpoint's peer (the writer) has closed, in
    /// which case the unconsumed bytes are abandoned.
    pub fn wait_for_draining<G>(&self, registry: G) {
        let st = self.lock();
        drop(registry);

        let goal = st.enqueued;
        if st.retired() < goal {
            ktrace!("des {}: drain waits on backlog {}", self.des, st.backlog);
            let st = self
                .drain_cv
                .wait_while(st, |s| s.retired() < goal && s.peer.is_open())
                .unwrap_or_else(PoisonError::into_inner);
            ktrace!("des {}: drained, backlog {}", self.des, st.backlog);
        }
    }

    /// Threshold read: wait for `min` bytes, copy up to `buf.len()`.
    ///
    /// Returns a short count (possibly 0) once the peer has closed. A
    /// rejected call leaves the state untouched.
    pub fn read(
        &self,
        buf: &mut [u8],
        min: usize,
        timeout: TimeoutPolicy,
    ) -> Result<usize, Misuse> {
        let min = isize::try_from(min).unwrap_or(isize::MAX);
        let mut st = self.lock();

        if st.closed {
            return Ok(0);
        }
        if st.backlog >= min || st.peer.is_closed() {
            return Ok(self.take(&mut st, buf));
        }

        if st.backlog < 0 {
            return Err(Misuse::ConcurrentReadClaim { des: self.des });
        }
        match timeout {
            TimeoutPolicy::BlockIndefinitely => {}
            TimeoutPolicy::NoWait => return Ok(self.take(&mut st, buf)),
            policy => {
                return Err(Misuse::UnsupportedTimeout { des: self.des, policy });
            }
        }

        // Claim the deficit. backlog was < min so it is now <= 0, which is
        // what drainers are waiting for.
        st.backlog -= min;
        self.drain_cv.notify_all();
        ktrace!("des {}: read claims {}, backlog {}", self.des, min, st.backlog);

        let mut st = self
            .read_cv
            .wait_while(st, |s| s.backlog < 0 && s.peer.is_open())
            .unwrap_or_else(PoisonError::into_inner);

        if st.closed {
            // Closed underneath us: the claim was already dropped.
            ktrace!("des {}: read released by local close", self.des);
            return Ok(0);
        }

        let copied = self.ring.read(buf);
        st.backlog += min - copied as isize;
        if copied > 0 || st.backlog <= 0 {
            self.drain_cv.notify_all();
        }
        ktrace!("des {}: read woke with {} bytes, backlog {}", self.des, copied, st.backlog);
        Ok(copied)
    }

    /// Copy what is buffered without claiming anything.
    fn take(&self, st: &mut EndpointState, buf: &mut [u8]) -> usize {
        let copied = self.ring.read(buf);
        if copied > 0 {
            st.backlog -= copied as isize;
            self.drain_cv.notify_all();
        }
        copied
    }

    /// Close this endpoint.
    ///
    /// Locks this endpoint and `peer` (lower descriptor first), runs
    /// `os_close`, and only if that succeeds marks the peer closed and
    /// releases every waiter that can no longer be satisfied. The caller
    /// holds the registry lock and removes the endpoint afterwards.
    pub fn close<F>(&self, peer: Option<&Endpoint>, os_close: F) -> VsResult<()>
    where
        F: FnOnce() -> VsResult<()>,
    {
        match peer {
            None => {
                let mut own = self.lock();
                os_close()?;
                self.abandon(&mut own);
            }
            Some(peer) => {
                let (mut own, mut theirs) = if self.des < peer.des {
                    let own = self.lock();
                    (own, peer.lock())
                } else {
                    let theirs = peer.lock();
                    (self.lock(), theirs)
                };
                os_close()?;

                theirs.peer = DescriptorId::CLOSED;
                if theirs.backlog < 0 {
                    // Reader on the peer will never get more data.
                    peer.read_cv.notify_one();
                } else if theirs.backlog > 0 {
                    peer.drain_cv.notify_all();
                }
                self.abandon(&mut own);
            }
        }
        Ok(())
    }

    /// Reset local backlog on close, releasing anyone still parked here.
    fn abandon(&self, own: &mut EndpointState) {
        own.closed = true;
        if own.backlog > 0 {
            // Unread bytes are discarded; the peer's drainers can go.
            own.backlog = 0;
            self.drain_cv.notify_all();
        } else if own.backlog < 0 {
            own.backlog = 0;
            self.read_cv.notify_one();
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.snapshot();
        f.debug_struct("Endpoint")
            .field("des", &self.des)
            .field("peer", &st.peer)
            .field("backlog", &st.backlog)
            .field("ring", &self.ring)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pair() -> (Arc<Endpoint>, Arc<Endpoint>) {
        let config = PipeConfig::new();
        let a = Arc::new(Endpoint::new(DescriptorId::new(10), DescriptorId::new(11), &config));
        let b = Arc::new(Endpoint::new(DescriptorId::new(11), DescriptorId::new(10), &config));
        (a, b)
    }

    #[test]
    fn test_write_then_read() {
        let (_a, b) = pair();
        assert_eq!(b.write((), b"hello"), 5);
        assert_eq!(b.backlog(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(b.read(&mut buf, 1, TimeoutPolicy::BlockIndefinitely), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(b.backlog(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf, 2, TimeoutPolicy::BlockIndefinitely), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(b.backlog(), 0);
    }

    #[test]
    fn test_no_wait_returns_what_is_there() {
        let (_a, b) = pair();
        b.write((), b"ab");

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf, 5, TimeoutPolicy::NoWait), Ok(2));
        assert_eq!(b.backlog(), 0);
        assert_eq!(b.read(&mut buf, 5, TimeoutPolicy::NoWait), Ok(0));
    }

    #[test]
    fn test_timed_policy_rejected_only_when_blocking() {
        let (_a, b) = pair();
        let mut buf = [0u8; 8];
        let policy = TimeoutPolicy::InterByte(Duration::from_millis(10));

        assert_eq!(
            b.read(&mut buf, 1, policy),
            Err(Misuse::UnsupportedTimeout { des: b.des(), policy })
        );
        assert_eq!(b.backlog(), 0);

        // Enough data: no wait needed, so the policy is never consulted.
        b.write((), b"x");
        assert_eq!(b.read(&mut buf, 1, policy), Ok(1));
    }

    #[test]
    fn test_blocked_read_wakes_on_write() {
        let (_a, b) = pair();
        b.write((), b"abc");

        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                let n = b.read(&mut buf, 10, TimeoutPolicy::BlockIndefinitely).unwrap();
                buf[..n].to_vec()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(b.backlog(), -7);

        b.write((), b"defghij");
        let got = reader.join().unwrap();
        assert_eq!(got, b"abcdefghij");
        assert_eq!(b.backlog(), 0);
    }

    #[test]
    fn test_second_claim_is_misuse() {
        let (_a, b) = pair();
        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                b.read(&mut buf, 4, TimeoutPolicy::BlockIndefinitely)
            })
        };
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 4];
        assert_eq!(
            b.read(&mut buf, 4, TimeoutPolicy::BlockIndefinitely),
            Err(Misuse::ConcurrentReadClaim { des: b.des() })
        );
        assert_eq!(b.backlog(), -4);

        b.write((), b"1234");
        assert_eq!(reader.join().unwrap(), Ok(4));
    }

    #[test]
    fn test_drain_waits_for_consumption() {
        let (_a, b) = pair();
        b.write((), b"12345");

        let (tx, rx) = mpsc::channel();
        let drainer = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                b.wait_for_draining(());
                tx.send(()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());

        let mut buf = [0u8; 3];
        b.read(&mut buf, 1, TimeoutPolicy::BlockIndefinitely).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err(), "drain returned with 2 bytes unread");

        b.read(&mut buf, 2, TimeoutPolicy::BlockIndefinitely).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drainer.join().unwrap();
    }

    #[test]
    fn test_drain_not_extended_by_later_writes() {
        let (_a, b) = pair();
        b.write((), b"first");

        let drainer = {
            let b = Arc::clone(&b);
            thread::spawn(move || b.wait_for_draining(()))
        };
        thread::sleep(Duration::from_millis(50));
        b.write((), b"second");

        let mut buf = [0u8; 5];
        b.read(&mut buf, 5, TimeoutPolicy::BlockIndefinitely).unwrap();
        assert_eq!(&buf, b"first");
        drainer.join().unwrap();
        assert_eq!(b.backlog(), 6);
        assert_eq!(b.snapshot().retired(), 5);
    }

    #[test]
    fn test_drain_immediate_when_empty() {
        let (_a, b) = pair();
        b.wait_for_draining(());
    }

    #[test]
    fn test_close_wakes_blocked_reader_with_short_count() {
        let (a, b) = pair();
        b.write((), b"hi");

        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                let n = b.read(&mut buf, 5, TimeoutPolicy::BlockIndefinitely).unwrap();
                buf[..n].to_vec()
            })
        };
        thread::sleep(Duration::from_millis(50));

        a.close(Some(&b), || Ok(())).unwrap();
        assert_eq!(reader.join().unwrap(), b"hi");
        assert!(b.peer().is_closed());
        assert_eq!(b.backlog(), 0);

        // EOF from now on
        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf, 1, TimeoutPolicy::BlockIndefinitely), Ok(0));
    }

    #[test]
    fn test_close_discards_unread_and_releases_drainer() {
        let (a, b) = pair();
        // b's writer put data into a, and waits for a's reader to consume it
        a.write((), b"unread");

        let drainer = {
            let a = Arc::clone(&a);
            thread::spawn(move || a.wait_for_draining(()))
        };
        thread::sleep(Duration::from_millis(50));

        a.close(Some(&b), || Ok(())).unwrap();
        drainer.join().unwrap();
        assert_eq!(a.backlog(), 0);
    }

    #[test]
    fn test_local_close_releases_own_reader_cleanly() {
        let (a, b) = pair();
        b.write((), b"ab");

        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                b.read(&mut buf, 5, TimeoutPolicy::BlockIndefinitely)
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(b.backlog(), -3);

        b.close(Some(&a), || Ok(())).unwrap();
        assert_eq!(reader.join().unwrap(), Ok(0));

        let st = b.snapshot();
        assert!(st.closed);
        assert_eq!(st.backlog, 0);
        assert_eq!(st.retired(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf, 1, TimeoutPolicy::BlockIndefinitely), Ok(0));
        assert!(a.peer().is_closed());
    }

    #[test]
    fn test_close_releases_drainer_of_own_writes() {
        let (a, b) = pair();
        // a's writer put these into b and is waiting for b's reader
        b.write((), b"pending");

        let (tx, rx) = mpsc::channel();
        let drainer = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                b.wait_for_draining(());
                tx.send(()).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());

        a.close(Some(&b), || Ok(())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drainer.join().unwrap();
        assert!(b.peer().is_closed());
        assert_eq!(b.backlog(), 7);
    }

    #[test]
    fn test_close_failure_leaves_state() {
        let (a, b) = pair();
        a.write((), b"xy");
        let err = a.close(Some(&b), || Err(nix::errno::Errno::EIO.into()));
        assert!(err.is_err());
        assert_eq!(a.backlog(), 2);
        assert!(b.peer().is_open());
    }
}
