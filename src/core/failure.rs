//! Classified failures returned by the sandbox
//!
//! Every failure carries a machine-readable kind, a human-readable message,
//! a retryable flag and a small evidence map. Evidence is bounded: it never
//! holds full program output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Number of argv elements kept in evidence
pub const EVIDENCE_ARGV_LEN: usize = 3;
/// Number of trailing stderr bytes kept in evidence
pub const EVIDENCE_STDERR_TAIL: usize = 512;

/// Fixed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Bad configuration value
    #[serde(rename = "E_CONFIG")]
    Config,
    /// Isolation tool missing, launch failure, or non-zero exit
    #[serde(rename = "E_SANDBOX")]
    Sandbox,
    /// Wall-clock timeout exceeded
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Config => "E_CONFIG",
            FailureKind::Sandbox => "E_SANDBOX",
            FailureKind::Timeout => "E_TIMEOUT",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A classified failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    pub evidence: BTreeMap<String, Value>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            evidence: BTreeMap::new(),
        }
    }

    /// Non-retryable configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Config, message, false)
    }

    /// Non-retryable sandbox failure
    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Sandbox, message, false)
    }

    /// Retryable timeout failure
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message, true)
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    /// Attach the first few argv elements as `cmd`
    pub fn with_argv(self, argv: &[String]) -> Self {
        let head: Vec<Value> = argv
            .iter()
            .take(EVIDENCE_ARGV_LEN)
            .map(|a| Value::String(a.clone()))
            .collect();
        self.with_evidence("cmd", Value::Array(head))
    }

    /// Attach the tail of stderr as `stderr`
    pub fn with_stderr_tail(self, stderr: &[u8]) -> Self {
        self.with_evidence("stderr", stderr_tail(stderr))
    }

    /// Wire form used by the CLI and by callers that log failures
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": self.message,
            "code": self.kind.code(),
            "retryable": self.retryable,
            "evidence": self.evidence,
        })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Tail of a stream as text of at most `EVIDENCE_STDERR_TAIL` bytes.
///
/// Invalid UTF-8 decodes to U+FFFD (3 bytes each), so the bound is applied
/// to the decoded text, cutting forward to the next char boundary.
pub fn stderr_tail(bytes: &[u8]) -> String {
    let mut start = bytes.len().saturating_sub(EVIDENCE_STDERR_TAIL);
    while start < bytes.len() && (bytes[start] & 0b1100_0000) == 0b1000_0000 {
        start += 1;
    }
    let text = String::from_utf8_lossy(&bytes[start..]);

    let mut cut = text.len().saturating_sub(EVIDENCE_STDERR_TAIL);
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(FailureKind::Config.to_string(), "E_CONFIG");
        assert_eq!(FailureKind::Sandbox.to_string(), "E_SANDBOX");
        assert_eq!(FailureKind::Timeout.to_string(), "E_TIMEOUT");
    }

    #[test]
    fn test_default_retryability() {
        assert!(!Failure::config("x").retryable);
        assert!(!Failure::sandbox("x").retryable);
        assert!(Failure::timeout("x").retryable);
    }

    #[test]
    fn test_argv_evidence_is_truncated() {
        let argv: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let failure = Failure::sandbox("boom").with_argv(&argv);
        assert_eq!(failure.evidence["cmd"], serde_json::json!(["a", "b", "c"]));
    }

    #[test]
    fn test_stderr_tail_bounds() {
        let long = vec![b'x'; 2000];
        assert_eq!(stderr_tail(&long).len(), EVIDENCE_STDERR_TAIL);
        assert_eq!(stderr_tail(b"short"), "short");
    }

    #[test]
    fn test_stderr_tail_respects_char_boundary() {
        // 3-byte characters so the 512-byte cut lands mid-character
        let text = "가".repeat(300);
        let tail = stderr_tail(text.as_bytes());
        assert!(tail.len() <= EVIDENCE_STDERR_TAIL);
        assert!(tail.chars().all(|c| c == '가'));
    }

    #[test]
    fn test_stderr_tail_invalid_utf8_stays_bounded() {
        let garbage = vec![0xffu8; 2000];
        let tail = stderr_tail(&garbage);
        assert!(tail.len() <= EVIDENCE_STDERR_TAIL, "tail is {} bytes", tail.len());
        assert!(tail.chars().all(|c| c == char::REPLACEMENT_CHARACTER));

        let mut mixed = vec![0xfeu8; 100];
        mixed.extend_from_slice(b"fatal: out of memory");
        let tail = stderr_tail(&mixed);
        assert!(tail.len() <= EVIDENCE_STDERR_TAIL);
        assert!(tail.ends_with("fatal: out of memory"));
    }

    #[test]
    fn test_to_json_shape() {
        let failure = Failure::timeout("sandbox timeout").with_evidence("timeout_secs", 1);
        let json = failure.to_json();
        assert_eq!(json["code"], "E_TIMEOUT");
        assert_eq!(json["error"], "sandbox timeout");
        assert_eq!(json["retryable"], true);
        assert_eq!(json["evidence"]["timeout_secs"], 1);
    }
}
