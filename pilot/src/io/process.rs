//! Child processes for tools and the planner backend: bounded time, bounded
//! output, and a result text the classifier can read.

use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// One output stream, kept up to the byte limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the limit and discarded.
    pub dropped: u64,
}

impl Captured {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// `[label stream truncated N bytes]` line, or empty when nothing was dropped.
    pub fn notice(&self, label: &str, stream: &str) -> String {
        if self.dropped == 0 {
            return String::new();
        }
        format!("\n[{label} {stream} truncated {} bytes]\n", self.dropped)
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Result text for a tool invocation.
    ///
    /// Successful runs report stdout. Failures are prefixed with `Error:` so
    /// the classifier sees the generic failure marker.
    pub fn result_text(&self, label: &str, timeout: Duration) -> String {
        if self.timed_out {
            return format!(
                "Error: {label} timed out after {}s{}",
                timeout.as_secs(),
                self.stderr.notice(label, "stderr")
            );
        }
        let stdout = self.stdout.text();
        if self.status.success() {
            return format!(
                "{}{}",
                stdout.trim_end(),
                self.stdout.notice(label, "stdout")
            );
        }
        let stderr = self.stderr.text();
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        let code = self
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        format!(
            "Error: {label} failed (exit {code}): {detail}{}",
            self.stderr.notice(label, "stderr")
        )
    }
}

/// Run `cmd` to completion or until `timeout`, then kill it.
///
/// stdin is fed and both output pipes are drained on their own threads, so a
/// chatty child cannot block on a full pipe. At most `output_limit_bytes` per
/// stream are kept.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        (Some(_), None) => return Err(anyhow!("stdin was not piped")),
        _ => None,
    };
    let limit = u64::try_from(output_limit_bytes).unwrap_or(u64::MAX);
    let stdout = spawn_capture(child.stdout.take(), limit, "stdout")?;
    let stderr = spawn_capture(child.stderr.take(), limit, "stderr")?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    if let Some(writer) = writer {
        match writer.join() {
            // A child that exits without reading its input closes the pipe early.
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("child closed stdin early");
            }
            Ok(result) => result.context("write stdin")?,
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }
    let stdout = join_capture(stdout, "stdout")?;
    let stderr = join_capture(stderr, "stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn spawn_capture<R: Read + Send + 'static>(
    pipe: Option<R>,
    limit: u64,
    stream: &str,
) -> Result<JoinHandle<io::Result<Captured>>> {
    let mut pipe = pipe.ok_or_else(|| anyhow!("{stream} was not piped"))?;
    Ok(thread::spawn(move || {
        let mut captured = Captured::default();
        (&mut pipe).take(limit).read_to_end(&mut captured.bytes)?;
        captured.dropped = io::copy(&mut pipe, &mut io::sink())?;
        Ok(captured)
    }))
}

fn join_capture(handle: JoinHandle<io::Result<Captured>>, stream: &str) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("{stream} reader thread panicked"))?
        .with_context(|| format!("read {stream}"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn feeds_stdin_and_captures_stdout() {
        let output = run_command_with_timeout(
            sh("cat; echo done"),
            Some(b"hello\n"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout.text(), "hello\ndone\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn child_ignoring_stdin_is_not_an_error() {
        let input = vec![b'x'; 1 << 20];
        let output =
            run_command_with_timeout(sh("echo ok"), Some(&input), Duration::from_secs(10), 1024)
                .expect("run");
        assert_eq!(output.stdout.text(), "ok\n");
    }

    #[test]
    fn kills_on_timeout() {
        let timeout = Duration::from_secs(1);
        let output = run_command_with_timeout(sh("sleep 5"), None, timeout, 1024).expect("run");
        assert!(output.timed_out);
        let text = output.result_text("sleeper", timeout);
        assert!(text.starts_with("Error: sleeper timed out after 1s"), "{text}");
    }

    #[test]
    fn keeps_output_up_to_the_limit() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            None,
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout.bytes, b"abcd");
        assert_eq!(output.stdout.dropped, 6);
        assert!(
            output
                .result_text("t", Duration::from_secs(10))
                .contains("[t stdout truncated 6 bytes]")
        );
    }

    #[test]
    fn failure_text_carries_error_prefix_and_stderr() {
        let timeout = Duration::from_secs(10);
        let output =
            run_command_with_timeout(sh("echo boom >&2; exit 3"), None, timeout, 1024).expect("run");
        assert_eq!(
            output.result_text("press_keys", timeout),
            "Error: press_keys failed (exit 3): boom"
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command_with_timeout(
            Command::new("/nonexistent/pilot-tool"),
            None,
            Duration::from_secs(1),
            16,
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
