//! Sandboxed runner implementation using nsjail
//!
//! Executes an arbitrary argv inside nsjail with a wall-clock timeout and
//! classifies the result. Every path out of `run_with_timeout` is either a
//! `Success` with exit code 0 or a typed `Failure`.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ExecutionOutcome, Invocation};
use crate::core::Failure;
use crate::sandbox::{build_args, resolve_tool};

const READ_CHUNK: usize = 8192;

/// Run an invocation with the timeout from its config
pub async fn run(invocation: &Invocation) -> ExecutionOutcome {
    run_with_timeout(invocation, invocation.config.timeout).await
}

/// Run an invocation inside nsjail, bounded by `timeout` of wall-clock time
pub async fn run_with_timeout(invocation: &Invocation, timeout: Duration) -> ExecutionOutcome {
    let argv = &invocation.argv;
    let config = &invocation.config;

    if argv.is_empty() {
        return Failure::sandbox("No command specified for execution").into();
    }

    let Some(tool) = resolve_tool(config) else {
        return Failure::sandbox(format!("{} not installed; required", config.tool_name))
            .with_argv(argv)
            .into();
    };

    let args = build_args(config, argv);
    debug!("Running {:?} with args: {:?}", tool, args);

    let mut cmd = Command::new(&tool);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let started = Instant::now();

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return launch_failure(argv, "Failed to spawn sandbox", &e),
    };
    // process_group(0) makes the child the leader of its own group
    let pgid = child.id();

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        kill_tree(pgid, &mut child).await;
        return Failure::sandbox("Sandbox output pipes unavailable")
            .with_argv(argv)
            .into();
    };

    let limit = config.max_output_bytes;
    let stdout_task = tokio::spawn(read_bounded(stdout, limit));
    let stderr_task = tokio::spawn(read_bounded(stderr, limit));
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    info!("Started sandboxed {:?} (pid {:?})", argv.first(), pgid);

    // Readers must finish too: a straggler holding the pipes counts against the deadline.
    // tokio::time::timeout saturates instead of overflowing on huge durations.
    let waited = tokio::time::timeout(timeout, async {
        let status = child.wait().await?;
        let stdout = stdout_task.await.map_err(io::Error::other)??;
        let stderr = stderr_task.await.map_err(io::Error::other)??;
        Ok::<_, io::Error>((status, stdout, stderr))
    })
    .await;

    match waited {
        Ok(Ok((status, stdout, stderr))) => {
            if stdout.truncated || stderr.truncated {
                warn!(
                    "Sandboxed output truncated to {} bytes (stdout: {}, stderr: {})",
                    limit, stdout.truncated, stderr.truncated
                );
            }
            info!(
                "Sandboxed {:?} finished with {} in {:?}",
                argv.first(),
                status,
                started.elapsed()
            );
            classify_exit(invocation, status, stdout.bytes, stderr.bytes)
        }
        Ok(Err(e)) => {
            kill_tree(pgid, &mut child).await;
            readers.iter().for_each(|r| r.abort());
            launch_failure(argv, "Failed to wait for sandbox", &e)
        }
        Err(_) => {
            warn!(
                "Sandboxed {:?} exceeded {:?}, killing process group",
                argv.first(),
                timeout
            );
            kill_tree(pgid, &mut child).await;
            readers.iter().for_each(|r| r.abort());
            Failure::timeout("sandbox timeout")
                .with_argv(argv)
                .with_evidence("timeout_secs", timeout.as_secs_f64())
                .into()
        }
    }
}

fn classify_exit(
    invocation: &Invocation,
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
) -> ExecutionOutcome {
    if status.success() {
        return ExecutionOutcome::success(stdout, stderr);
    }

    let argv = &invocation.argv;
    match status.code() {
        Some(code) => {
            let retryable = invocation.config.retryable_exit_codes.contains(&code);
            Failure::sandbox(format!("sandboxed process failed: rc={}", code))
                .with_retryable(retryable)
                .with_argv(argv)
                .with_stderr_tail(&stderr)
                .with_evidence("exit_code", code)
                .into()
        }
        None => {
            let signal = status.signal().unwrap_or(0);
            Failure::sandbox(format!("sandboxed process killed by signal {}", signal))
                .with_argv(argv)
                .with_stderr_tail(&stderr)
                .with_evidence("signal", signal)
                .into()
        }
    }
}

fn launch_failure(argv: &[String], message: &str, err: &io::Error) -> ExecutionOutcome {
    warn!("{}: {}", message, err);
    Failure::sandbox(message)
        .with_argv(argv)
        .with_evidence("error", err.to_string())
        .into()
}

/// Kill the whole process group, then reap the leader
async fn kill_tree(pgid: Option<u32>, child: &mut Child) {
    if let Some(pid) = pgid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("killpg({}) failed: {}", pid, e);
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to reap sandbox child: {}", e);
    }
}

/// Output captured from one stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Read a stream to EOF, keeping at most `limit` bytes and discarding the rest
async fn read_bounded<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(captured)
}
