//! Pipe configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! ```rust,ignore
//! use vserial_core::config::PipeConfig;
//! use vserial_core::MisusePolicy;
//!
//! // Defaults with env overrides
//! let config = PipeConfig::from_env();
//!
//! // Or fully explicit, for tests
//! let config = PipeConfig::new()
//!     .buffer_size(4096)
//!     .misuse_policy(MisusePolicy::Fail);
//! ```

pub mod defaults;

use crate::env::env_get;
use crate::policy::MisusePolicy;

/// Registry configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConfig {
    /// Bytes each endpoint's ring can hold before writes truncate
    pub buffer_size: usize,
    /// Ring allocation granularity
    pub block_size: usize,
    /// Reaction to usage-contract violations
    pub misuse_policy: MisusePolicy,
    /// Table slots present at startup
    pub initial_slots: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PipeConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `VSERIAL_BUFFER_SIZE` - Ring capacity per endpoint, in bytes
    /// - `VSERIAL_BLOCK_SIZE` - Ring allocation granularity
    /// - `VSERIAL_MISUSE` - `abort` or `fail`
    /// - `VSERIAL_INITIAL_SLOTS` - Registry slots at startup
    pub fn from_env() -> Self {
        Self {
            buffer_size: env_get("VSERIAL_BUFFER_SIZE", defaults::BUFFER_SIZE),
            block_size: env_get("VSERIAL_BLOCK_SIZE", defaults::BLOCK_SIZE),
            misuse_policy: env_get("VSERIAL_MISUSE", defaults::MISUSE_POLICY),
            initial_slots: env_get("VSERIAL_INITIAL_SLOTS", defaults::INITIAL_SLOTS),
        }
    }

    /// Library defaults, ignoring the environment
    pub fn new() -> Self {
        Self {
            buffer_size: defaults::BUFFER_SIZE,
            block_size: defaults::BLOCK_SIZE,
            misuse_policy: defaults::MISUSE_POLICY,
            initial_slots: defaults::INITIAL_SLOTS,
        }
    }

    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = n;
        self
    }

    pub fn block_size(mut self, n: usize) -> Self {
        self.block_size = n;
        self
    }

    pub fn misuse_policy(mut self, policy: MisusePolicy) -> Self {
        self.misuse_policy = policy;
        self
    }

    pub fn initial_slots(mut self, n: usize) -> Self {
        self.initial_slots = n;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.buffer_size == 0 {
            return Err("buffer_size must be at least 1");
        }
        if self.block_size == 0 {
            return Err("block_size must be at least 1");
        }
        Ok(())
    }
}
