//! Descriptor registry
//!
//! Maps descriptor numbers to managed endpoints. A slot holding `None`
//! is a plain descriptor and every call on it goes straight to the OS.
//! Descriptors at or beyond the table length were never created through
//! this registry and are a usage error.
//!
//! # Locking
//!
//! One table mutex serializes pair creation, open and close. `write` and
//! `drain` hold it while looking up the peer endpoint, take the endpoint
//! lock, and only then let the table lock go, so the peer cannot close
//! underneath them. The endpoint mutex is the only lock held across a wait.
//!
//! ```text
//!   table ──lookup──> endpoint lock ──release table──> enqueue / wait
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use vserial_core::{
    kdebug, kerror, ktrace, kwarn, DescriptorId, Misuse, MisusePolicy, PipeConfig, TimeoutPolicy,
    VsError, VsResult,
};

use crate::endpoint::Endpoint;
use crate::native;

type Table = Vec<Option<Arc<Endpoint>>>;

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Process-wide descriptor table plus the configuration new pairs use
pub struct Registry {
    table: Mutex<Table>,
    config: PipeConfig,
}

impl Registry {
    /// Create an independent registry.
    ///
    /// Invalid ring sizes fall back to the library defaults.
    pub fn new(mut config: PipeConfig) -> Self {
        if let Err(msg) = config.validate() {
            kwarn!("{}, using default ring sizes", msg);
            let defaults = PipeConfig::new();
            config.buffer_size = defaults.buffer_size;
            config.block_size = defaults.block_size;
        }
        Self {
            table: Mutex::new(vec![None; config.initial_slots]),
            config,
        }
    }

    /// Shared registry behind the crate-level free functions.
    ///
    /// Built on first use from `PipeConfig::from_env()`.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(|| Registry::new(PipeConfig::from_env()))
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the misuse policy. Returns only under `MisusePolicy::Fail`.
    fn misuse(&self, m: Misuse) -> VsError {
        kerror!("{}", m);
        match self.config.misuse_policy {
            MisusePolicy::Abort => std::process::abort(),
            MisusePolicy::Fail => VsError::PreconditionViolated(m),
        }
    }

    /// Look up a slot; out-of-range descriptors are misuse.
    fn slot(&self, table: &Table, des: DescriptorId) -> VsResult<Option<Arc<Endpoint>>> {
        match des.index() {
            Some(i) if i < table.len() => Ok(table[i].clone()),
            _ => Err(self.misuse(Misuse::UnknownDescriptor { des, known: table.len() })),
        }
    }

    fn grow(table: &mut Table, des: DescriptorId) {
        if let Some(i) = des.index() {
            if i >= table.len() {
                table.resize(i + 1, None);
            }
        }
    }

    /// Endpoint of a live peer, if any.
    fn peer_endpoint(table: &Table, ep: &Endpoint) -> Option<Arc<Endpoint>> {
        let peer = ep.peer();
        peer.index().and_then(|i| table.get(i).cloned().flatten())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a connected duplex pair.
    ///
    /// Bytes written to one descriptor are read from the other.
    pub fn open_pair(&self) -> VsResult<(DescriptorId, DescriptorId)> {
        let mut table = self.lock();
        let (a, b) = native::socketpair()?;

        Self::grow(&mut table, a.max(b));
        let slot = |d: DescriptorId| d.index().unwrap_or_default();
        table[slot(a)] = Some(Arc::new(Endpoint::new(a, b, &self.config)));
        table[slot(b)] = Some(Arc::new(Endpoint::new(b, a, &self.config)));

        kdebug!("pair ({}, {}) created, {} bytes each way", a, b, self.config.buffer_size);
        Ok((a, b))
    }

    /// Open a regular file; its descriptor is passed through from now on.
    pub fn open<P: AsRef<Path>>(&self, path: P, flags: OFlag, mode: Mode) -> VsResult<DescriptorId> {
        let mut table = self.lock();
        let des = native::open(path.as_ref(), flags, mode)?;
        Self::grow(&mut table, des);
        // A reused number must not inherit a stale endpoint.
        if let Some(i) = des.index() {
            table[i] = None;
        }
        Ok(des)
    }

    /// Create (or truncate) a regular file for writing.
    pub fn create<P: AsRef<Path>>(&self, path: P, mode: Mode) -> VsResult<DescriptorId> {
        let mut table = self.lock();
        let des = native::creat(path.as_ref(), mode)?;
        Self::grow(&mut table, des);
        if let Some(i) = des.index() {
            table[i] = None;
        }
        Ok(des)
    }

    /// Make a descriptor opened elsewhere known, as a pass-through.
    ///
    /// Fails with `EBUSY` if `des` is currently a managed endpoint.
    pub fn adopt(&self, des: DescriptorId) -> VsResult<()> {
        let mut table = self.lock();
        if des.is_closed() {
            return Err(nix::errno::Errno::EBADF.into());
        }
        Self::grow(&mut table, des);
        if let Some(i) = des.index() {
            if table[i].is_some() {
                return Err(nix::errno::Errno::EBUSY.into());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Data path
    // ========================================================================

    /// Enqueue toward the peer. Never blocks on a managed descriptor.
    ///
    /// May write fewer bytes than given when the peer's ring is short on room.
    pub fn write(&self, des: DescriptorId, data: &[u8]) -> VsResult<usize> {
        let table = self.lock();
        let ep = match self.slot(&table, des)? {
            Some(ep) => ep,
            None => {
                drop(table);
                return native::write(des, data);
            }
        };

        let target = match Self::peer_endpoint(&table, &ep) {
            Some(target) => target,
            None => {
                ktrace!("des {}: write after peer closed", des);
                return Err(VsError::BrokenPipe);
            }
        };
        Ok(target.write(table, data))
    }

    /// POSIX-style read: at least one byte, or 0 at end of stream.
    pub fn read(&self, des: DescriptorId, buf: &mut [u8]) -> VsResult<usize> {
        let ep = {
            let table = self.lock();
            self.slot(&table, des)?
        };
        match ep {
            Some(ep) => ep
                .read(buf, 1, TimeoutPolicy::BlockIndefinitely)
                .map_err(|m| self.misuse(m)),
            None => native::read(des, buf),
        }
    }

    /// Threshold read: wait for at least `min` bytes, copy up to `buf.len()`.
    ///
    /// Returns a short count once the peer has closed. Only `NoWait` and
    /// `BlockIndefinitely` are accepted on managed descriptors.
    pub fn read_cond(
        &self,
        des: DescriptorId,
        buf: &mut [u8],
        min: usize,
        timeout: TimeoutPolicy,
    ) -> VsResult<usize> {
        // Close is not called while a read is in flight, so the endpoint
        // stays valid after the table lock is released.
        let ep = {
            let table = self.lock();
            self.slot(&table, des)?
        };
        match ep {
            Some(ep) => ep.read(buf, min, timeout).map_err(|m| self.misuse(m)),
            None => {
                if !timeout.is_supported() {
                    kwarn!("des {}: {} read not supported, refusing", des, timeout);
                } else {
                    kdebug!("des {}: threshold read on a plain descriptor", des);
                }
                native::read_cond(des, buf, min, timeout)
            }
        }
    }

    /// Block until the peer has consumed everything written so far.
    ///
    /// Returns at once if the peer has already closed.
    pub fn drain(&self, des: DescriptorId) -> VsResult<()> {
        let table = self.lock();
        let ep = match self.slot(&table, des)? {
            Some(ep) => ep,
            None => {
                drop(table);
                return native::tcdrain(des);
            }
        };

        match Self::peer_endpoint(&table, &ep) {
            Some(target) => target.wait_for_draining(table),
            None => ktrace!("des {}: drain after peer closed", des),
        }
        Ok(())
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Close a descriptor.
    ///
    /// Must not be called while another operation on `des` is in flight.
    /// Waiters on the peer that can no longer be satisfied are released.
    pub fn close(&self, des: DescriptorId) -> VsResult<()> {
        let mut table = self.lock();
        let ep = match self.slot(&table, des)? {
            Some(ep) => ep,
            None => return native::close(des),
        };

        let peer = Self::peer_endpoint(&table, &ep);
        ep.close(peer.as_deref(), || native::close(des))?;

        if let Some(i) = des.index() {
            table[i] = None;
        }
        kdebug!("des {} closed (peer {})", des, ep.peer());
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// True if `des` is one end of a live pair
    pub fn is_managed(&self, des: DescriptorId) -> bool {
        let table = self.lock();
        matches!(des.index().and_then(|i| table.get(i)), Some(Some(_)))
    }

    /// Peer of a managed descriptor; `Some(CLOSED)` once the peer has gone
    pub fn peer_of(&self, des: DescriptorId) -> Option<DescriptorId> {
        self.endpoint(des).map(|ep| ep.peer())
    }

    /// Backlog of a managed descriptor's own buffer
    pub fn backlog(&self, des: DescriptorId) -> Option<isize> {
        self.endpoint(des).map(|ep| ep.backlog())
    }

    /// Number of table slots; descriptors below this are known
    pub fn known_range(&self) -> usize {
        self.lock().len()
    }

    fn endpoint(&self, des: DescriptorId) -> Option<Arc<Endpoint>> {
        let table = self.lock();
        des.index().and_then(|i| table.get(i).cloned().flatten())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(PipeConfig::from_env())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.lock();
        let managed: Vec<_> = table.iter().flatten().map(|ep| ep.des()).collect();
        f.debug_struct("Registry")
            .field("known", &table.len())
            .field("managed", &managed)
            .field("config", &self.config)
            .finish()
    }
}
