//! Best-effort version probing of external tools
//!
//! Runs `<tool> --version` directly, without the sandbox. Probing never
//! fails: any error collapses to an empty string.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for a single `--version` call
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// External tools reported by `version_info`
pub const PROBED_TOOLS: [&str; 3] = ["circom", "snarkjs", "nsjail"];

/// First line of `<tool> --version`, or an empty string on any failure
pub async fn tool_version(tool: impl AsRef<OsStr>) -> String {
    tool_version_with_timeout(tool, PROBE_TIMEOUT).await
}

pub async fn tool_version_with_timeout(tool: impl AsRef<OsStr>, timeout: Duration) -> String {
    let tool = tool.as_ref();
    let mut cmd = Command::new(tool);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!("{:?} --version exited with {}", tool, output.status);
            return String::new();
        }
        Ok(Err(e)) => {
            debug!("{:?} --version failed: {}", tool, e);
            return String::new();
        }
        Err(_) => {
            debug!("{:?} --version timed out", tool);
            return String::new();
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

/// Crate version plus the versions of the external tools it drives
pub async fn version_info() -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    info.insert("poi".to_string(), env!("CARGO_PKG_VERSION").to_string());

    for tool in PROBED_TOOLS {
        info.insert(tool.to_string(), tool_version(tool).await);
    }

    info
}
