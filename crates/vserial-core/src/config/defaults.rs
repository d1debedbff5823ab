//! Library defaults, overridable through `PipeConfig::from_env()`

use crate::policy::MisusePolicy;

/// Bytes each endpoint's ring can hold
pub const BUFFER_SIZE: usize = 300;

/// Ring allocation granularity
pub const BLOCK_SIZE: usize = 1;

/// Registry slots present before any descriptor is created (stdin, stdout, stderr)
pub const INITIAL_SLOTS: usize = 3;

pub const MISUSE_POLICY: MisusePolicy = MisusePolicy::Abort;
