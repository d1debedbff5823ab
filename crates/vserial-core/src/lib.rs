//! # vserial-core
//!
//! Core types for vserial, the drain-aware virtual serial line.
//!
//! This crate makes no OS calls. The blocking protocol, the descriptor
//! registry and the native pass-through live in `vserial`.
//!
//! ## Modules
//!
//! - `ring` - Lock-free SPSC byte ring backing each endpoint
//! - `id` - Descriptor identifier type
//! - `policy` - Read timeout and misuse policies
//! - `error` - Error types
//! - `config` - Registry configuration (defaults + env overrides)
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod ring;
pub mod id;
pub mod policy;
pub mod error;
pub mod config;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use ring::RingBuffer;
pub use id::DescriptorId;
pub use policy::{MisusePolicy, TimeoutPolicy};
pub use error::{Misuse, VsError, VsResult};
pub use config::PipeConfig;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
