//! Sandbox module - nsjail policy construction
//!
//! This module turns configuration into a concrete nsjail invocation:
//! - Resolving overrides against defaults (`config`)
//! - Locating the nsjail binary and assembling its flags (`jail`)
//!
//! The sandbox module does NOT:
//! - Spawn processes or enforce timeouts (that's the runner's job)
//! - Interpret the wrapped command's output

pub mod config;
pub mod jail;

pub use config::{ResourceLimits, SandboxConfig, SandboxOverrides};
pub use jail::{build_args, resolve_tool, ARG_SEPARATOR};
