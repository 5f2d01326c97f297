//! Runner module - Execution layer
//!
//! This module runs commands and reports what happened:
//! - `sandboxed`: runs a command inside nsjail and classifies the outcome
//! - `probe`: best-effort `--version` probing of external tools (unsandboxed)
//!
//! The runner module does NOT:
//! - Decide which flags nsjail gets (that's the sandbox module's job)
//! - Retry failed invocations; callers branch on `Failure::retryable`

pub mod probe;
pub mod sandboxed;

#[cfg(test)]
pub(crate) mod fixtures;

use serde_json::{json, Value};

use crate::core::Failure;
use crate::sandbox::SandboxConfig;

/// A command to run and the sandbox it runs in
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Target command; `argv[0]` is the program
    pub argv: Vec<String>,
    pub config: SandboxConfig,
}

impl Invocation {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>, config: SandboxConfig) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            config,
        }
    }
}

/// Result of a sandboxed run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The command exited with status 0; the exit code is implied
    Success { stdout: Vec<u8>, stderr: Vec<u8> },
    Failure(Failure),
}

impl ExecutionOutcome {
    pub fn success(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        ExecutionOutcome::Success { stdout, stderr }
    }

    /// Exit code of the target: always 0 for success, `None` for failures
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionOutcome::Success { .. } => Some(0),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ExecutionOutcome::Failure(failure) => Some(failure),
            ExecutionOutcome::Success { .. } => None,
        }
    }

    /// Stdout decoded lossily; empty for failures
    pub fn stdout_lossy(&self) -> String {
        match self {
            ExecutionOutcome::Success { stdout, .. } => String::from_utf8_lossy(stdout).into_owned(),
            ExecutionOutcome::Failure(_) => String::new(),
        }
    }

    pub fn into_result(self) -> Result<(Vec<u8>, Vec<u8>), Failure> {
        match self {
            ExecutionOutcome::Success { stdout, stderr, .. } => Ok((stdout, stderr)),
            ExecutionOutcome::Failure(failure) => Err(failure),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExecutionOutcome::Success { stdout, stderr } => json!({
                "stdout": String::from_utf8_lossy(stdout),
                "stderr": String::from_utf8_lossy(stderr),
                "exit_code": 0,
            }),
            ExecutionOutcome::Failure(failure) => failure.to_json(),
        }
    }
}

impl From<Failure> for ExecutionOutcome {
    fn from(failure: Failure) -> Self {
        ExecutionOutcome::Failure(failure)
    }
}

pub use probe::{tool_version, version_info};
pub use sandboxed::{run, run_with_timeout};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_json() {
        let outcome = ExecutionOutcome::success(b"hi\n".to_vec(), Vec::new());
        let json = outcome.to_json();

        assert_eq!(json["stdout"], "hi\n");
        assert_eq!(json["exit_code"], 0);
        assert!(outcome.is_success());
        assert!(outcome.failure().is_none());
    }

    #[test]
    fn test_exit_code_only_zero_for_success() {
        let success = ExecutionOutcome::success(Vec::new(), Vec::new());
        assert_eq!(success.exit_code(), Some(0));

        let failure: ExecutionOutcome = Failure::sandbox("sandboxed process failed: rc=3").into();
        assert_eq!(failure.exit_code(), None);
        assert!(failure.to_json().get("exit_code").is_none());
    }

    #[test]
    fn test_failure_conversion() {
        let outcome: ExecutionOutcome = Failure::timeout("sandbox timeout").into();

        assert!(!outcome.is_success());
        assert_eq!(outcome.stdout_lossy(), "");
        let err = outcome.into_result().unwrap_err();
        assert!(err.retryable);
    }

    #[test]
    fn test_invocation_new() {
        let invocation = Invocation::new(["echo", "hi"], SandboxConfig::default());
        assert_eq!(invocation.argv, vec!["echo".to_string(), "hi".to_string()]);
    }
}
