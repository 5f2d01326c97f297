//! poi-sandbox - run untrusted tool invocations inside nsjail
//!
//! ```no_run
//! # async fn demo() -> Result<(), poi_sandbox::core::Failure> {
//! use poi_sandbox::runner::{self, Invocation};
//! use poi_sandbox::sandbox::{SandboxConfig, SandboxOverrides};
//!
//! let config = SandboxConfig::build(&SandboxOverrides::from_env())?;
//! let outcome = runner::run(&Invocation::new(["echo", "hi"], config)).await;
//! let (stdout, _stderr) = outcome.into_result()?;
//! # let _ = stdout;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod runner;
pub mod sandbox;

pub use crate::core::{Failure, FailureKind};
pub use runner::{ExecutionOutcome, Invocation};
pub use sandbox::{SandboxConfig, SandboxOverrides};
