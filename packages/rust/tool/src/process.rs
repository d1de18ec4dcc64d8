//! Blocking subprocess execution with an optional deadline.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use formpipe_shared::{FormPipeError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Minimum wait for buffered output once the tool has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Captured result of a finished tool process.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `program args..` in `cwd`, blocking until it exits or `timeout` passes.
///
/// Spawn failures and non-zero exits become [`FormPipeError::Tool`]; an
/// expired deadline kills the child and returns [`FormPipeError::ToolTimeout`].
/// Output still held open by a grandchild is abandoned once the deadline
/// (plus a short grace) has passed.
pub(crate) fn run_tool(
    operation: &str,
    program: &str,
    args: &[&OsStr],
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<ToolOutput> {
    debug!(operation, program, ?args, cwd = %cwd.display(), "spawning tool");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FormPipeError::tool(operation, format!("failed to spawn `{program}`: {e}")))?;

    // Drain both pipes so a chatty tool can't stall on a full buffer.
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let start = Instant::now();
    let status = match timeout {
        None => child
            .wait()
            .map_err(|e| FormPipeError::tool(operation, format!("failed to wait: {e}")))?,
        Some(limit) => loop {
            let polled = child
                .try_wait()
                .map_err(|e| FormPipeError::tool(operation, format!("failed to wait: {e}")))?;
            if let Some(status) = polled {
                break status;
            }
            if start.elapsed() > limit {
                warn!(operation, program, timeout_secs = limit.as_secs(), "tool timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(FormPipeError::ToolTimeout {
                    operation: operation.to_string(),
                    timeout: limit,
                });
            }
            thread::sleep(POLL_INTERVAL);
        },
    };

    let deadline = timeout.map(|limit| (start + limit).max(Instant::now() + DRAIN_GRACE));
    let output = ToolOutput {
        status,
        stdout: collect(operation, "stdout", &stdout_reader, deadline),
        stderr: collect(operation, "stderr", &stderr_reader, deadline),
        elapsed: start.elapsed(),
    };

    debug!(
        operation,
        exit_code = ?output.status.code(),
        elapsed_ms = output.elapsed.as_millis(),
        "tool exited"
    );
    if !output.stdout.trim().is_empty() {
        debug!(operation, stdout = %output.stdout.trim_end(), "tool output");
    }

    if !output.status.success() {
        return Err(FormPipeError::tool(operation, failure_message(&output)));
    }

    Ok(output)
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe, giving up at `deadline`. The drain thread is
/// left detached if the pipe never closes.
fn collect(
    operation: &str,
    stream: &str,
    drained: &Receiver<Vec<u8>>,
    deadline: Option<Instant>,
) -> String {
    let bytes = match deadline {
        None => drained.recv().ok(),
        Some(deadline) => drained
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok(),
    };
    match bytes {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => {
            warn!(operation, stream, "tool output still open after exit, abandoning it");
            String::new()
        }
    }
}

fn failure_message(output: &ToolOutput) -> String {
    let status = match output.status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };

    let lines: Vec<&str> = output.stderr.trim_end().lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        status
    } else {
        format!("{status}: {tail}")
    }
}
