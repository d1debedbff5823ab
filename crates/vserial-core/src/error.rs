//! Error types for vserial

use core::fmt;
use nix::errno::Errno;

use crate::id::DescriptorId;
use crate::policy::TimeoutPolicy;

/// Result type for vserial operations
pub type VsResult<T> = Result<T, VsError>;

/// Errors returned by registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VsError {
    /// Native call failed (pass-through descriptor, or the OS side of a
    /// managed descriptor)
    Os(Errno),

    /// Write on a managed endpoint whose peer has closed
    BrokenPipe,

    /// Caller broke the usage contract
    PreconditionViolated(Misuse),
}

impl VsError {
    /// Closest POSIX errno for hosts that want C-style codes
    pub fn errno(&self) -> Errno {
        match self {
            VsError::Os(e) => *e,
            VsError::BrokenPipe => Errno::EPIPE,
            VsError::PreconditionViolated(Misuse::UnknownDescriptor { .. }) => Errno::EBADF,
            VsError::PreconditionViolated(_) => Errno::EINVAL,
        }
    }

    /// True for the fatal-misuse tier
    pub fn is_misuse(&self) -> bool {
        matches!(self, VsError::PreconditionViolated(_))
    }
}

impl fmt::Display for VsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VsError::Os(e) => write!(f, "os error: {}", e),
            VsError::BrokenPipe => write!(f, "broken pipe: peer closed"),
            VsError::PreconditionViolated(m) => write!(f, "precondition violated: {}", m),
        }
    }
}

impl std::error::Error for VsError {}

impl From<Errno> for VsError {
    fn from(e: Errno) -> Self {
        VsError::Os(e)
    }
}

impl From<Misuse> for VsError {
    fn from(m: Misuse) -> Self {
        VsError::PreconditionViolated(m)
    }
}

/// Usage-contract violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misuse {
    /// A second reader tried to claim a deficit while one is outstanding
    ConcurrentReadClaim { des: DescriptorId },

    /// Timed read requested on a managed endpoint
    UnsupportedTimeout { des: DescriptorId, policy: TimeoutPolicy },

    /// Descriptor beyond anything the registry has seen
    UnknownDescriptor { des: DescriptorId, known: usize },
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Misuse::ConcurrentReadClaim { des } => {
                write!(f, "descriptor {}: only one read call at a time is supported", des)
            }
            Misuse::UnsupportedTimeout { des, policy } => write!(
                f,
                "descriptor {}: only no-wait or blocking reads are supported, got {}",
                des, policy
            ),
            Misuse::UnknownDescriptor { des, known } => write!(
                f,
                "descriptor {} was never created here (known range 0..{})",
                des, known
            ),
        }
    }
}
