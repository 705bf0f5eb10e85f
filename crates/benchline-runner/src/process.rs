//! Child process execution with captured, masked output.
//!
//! Every child leads its own process group. On timeout the whole group gets
//! SIGTERM, then SIGKILL once the kill grace has passed, so grandchildren
//! (bench binaries started by a runner, jobs under `sh -c`) are reclaimed
//! along with the child.

use benchline_core::secrets::{SecretValue, mask_secrets};
use benchline_core::{Error, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Output line from a child process.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How to run and capture a child process.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Name used in log messages.
    pub label: String,
    /// Number of trailing merged lines kept.
    pub tail_lines: usize,
    /// Whether stdout lines count towards the tail.
    pub tail_stdout: bool,
    /// Kill the child once this elapses.
    pub timeout: Option<Duration>,
    /// Time between SIGTERM and SIGKILL after a timeout.
    pub kill_grace: Duration,
    /// Values masked out of every captured line.
    pub secrets: Vec<SecretValue>,
}

impl CaptureOptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tail_lines: 200,
            tail_stdout: true,
            timeout: None,
            kill_grace: Duration::from_secs(10),
            secrets: Vec::new(),
        }
    }

    pub fn tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Keep only stderr in the tail, for commands whose stdout is
    /// machine-readable.
    pub fn tail_stderr_only(mut self) -> Self {
        self.tail_stdout = false;
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn secret(mut self, secret: SecretValue) -> Self {
        self.secrets.push(secret);
        self
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub exit_code: i32,
    /// Full stdout.
    pub stdout: String,
    /// Last `tail_lines` lines of stdout and stderr, in arrival order.
    pub tail: String,
}

#[derive(Default)]
struct Collected {
    stdout: String,
    tail: VecDeque<String>,
}

enum GroupSignal {
    Terminate,
    Kill,
}

/// The process group led by a spawned child.
///
/// Killed on drop, so abandoning a [`run_captured`] future also reclaims
/// everything the child started.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn terminate(&self) {
        if let Some(pgid) = self.pgid {
            signal_group(pgid, GroupSignal::Terminate);
        }
    }

    /// Kill what is left of the group. Only the first call signals.
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid, GroupSignal::Kill);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, signal = ?signal, error = %e, "Failed to signal process group"),
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) {}

/// Spawn `command`, stream its output into the log and collect it.
///
/// On timeout the child's process group is terminated and the child reaped
/// before [`Error::Timeout`] is returned. Processes the child leaves behind
/// after a normal exit are killed as well.
pub async fn run_captured(mut command: Command, options: &CaptureOptions) -> Result<CapturedOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| {
        Error::Internal(format!("Failed to spawn {}: {}", options.label, e))
    })?;
    let mut group = ProcessGroup::new(child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("stderr was not captured".to_string()))?;

    let (tx, rx) = mpsc::channel(256);
    let readers = [
        spawn_reader(stdout, OutputStream::Stdout, tx.clone()),
        spawn_reader(stderr, OutputStream::Stderr, tx),
    ];
    let collector = tokio::spawn(collect(rx, options.clone()));

    let wait_result = match options.timeout {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    label = %options.label,
                    timeout_secs = limit.as_secs(),
                    "Process timed out, terminating"
                );
                terminate(&mut child, &mut group, options).await;
                for reader in &readers {
                    reader.abort();
                }
                return Err(Error::Timeout { timeout: limit });
            }
        },
        None => child.wait().await,
    };
    group.kill();

    // Wait for output streaming to complete
    for reader in readers {
        let _ = reader.await;
    }
    let collected = collector
        .await
        .map_err(|e| Error::Internal(format!("Output collector failed: {}", e)))?;

    let status = wait_result.map_err(|e| {
        Error::Internal(format!("Failed to wait for {}: {}", options.label, e))
    })?;
    let exit_code = status.code().unwrap_or(-1);

    debug!(label = %options.label, exit_code, "Process exited");

    Ok(CapturedOutput {
        exit_code,
        stdout: collected.stdout,
        tail: Vec::from(collected.tail).join("\n"),
    })
}

/// SIGTERM the group, wait out the grace period, then SIGKILL it.
async fn terminate(child: &mut Child, group: &mut ProcessGroup, options: &CaptureOptions) {
    group.terminate();
    if timeout(options.kill_grace, child.wait()).await.is_err() {
        warn!(
            label = %options.label,
            grace_secs = options.kill_grace.as_secs(),
            "Process still running after SIGTERM, killing"
        );
    }
    group.kill();

    if let Ok(None) = child.try_wait()
        && let Err(e) = child.kill().await
    {
        warn!(label = %options.label, error = %e, "Failed to kill timed out process");
    }
}

fn spawn_reader<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut line_number = 0u32;

        while let Ok(Some(line)) = lines.next_line().await {
            line_number += 1;
            let output = OutputLine {
                stream,
                content: line,
                line_number,
            };
            if tx.send(output).await.is_err() {
                break;
            }
        }
    })
}

async fn collect(mut rx: mpsc::Receiver<OutputLine>, options: CaptureOptions) -> Collected {
    let mut collected = Collected::default();

    while let Some(line) = rx.recv().await {
        let content = mask_secrets(&line.content, &options.secrets);
        debug!(label = %options.label, stream = ?line.stream, line = line.line_number, "{}", content);

        if line.stream == OutputStream::Stdout {
            collected.stdout.push_str(&content);
            collected.stdout.push('\n');
        }
        if options.tail_lines > 0 && (options.tail_stdout || line.stream == OutputStream::Stderr) {
            if collected.tail.len() == options.tail_lines {
                collected.tail.pop_front();
            }
            collected.tail.push_back(content);
        }
    }

    collected
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    #[cfg(target_os = "linux")]
    use super::liveness::gone_within;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let output = run_captured(sh("echo hello; echo oops >&2; exit 3"), &CaptureOptions::new("test"))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "hello\n");
        assert!(output.tail.contains("oops"));
    }

    #[tokio::test]
    async fn test_tail_keeps_last_lines() {
        let options = CaptureOptions::new("test").tail_lines(2);
        let output = run_captured(sh("for i in 1 2 3 4; do echo line$i; done"), &options)
            .await
            .unwrap();

        assert_eq!(output.tail, "line3\nline4");
        assert_eq!(output.stdout.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_secrets_are_masked() {
        let options = CaptureOptions::new("test").secret(SecretValue::new("s3cr3t"));
        let output = run_captured(sh("echo token=s3cr3t"), &options).await.unwrap();

        assert_eq!(output.stdout, "token=***\n");
        assert!(!output.tail.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let options = CaptureOptions::new("sleeper").timeout(Duration::from_millis(200));

        let start = Instant::now();
        let err = run_captured(cmd, &options).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_tail_can_exclude_stdout() {
        let options = CaptureOptions::new("test").tail_stderr_only();
        let output = run_captured(sh("echo '{\"reason\":\"build-finished\"}'; echo warning >&2"), &options)
            .await
            .unwrap();

        assert_eq!(output.tail, "warning");
        assert!(output.stdout.contains("build-finished"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let cmd = Command::new("/definitely/not/a/binary");
        let err = run_captured(cmd, &CaptureOptions::new("missing")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn missing"));
    }

    /// `sh` script that backgrounds a long sleep and records its pid.
    #[cfg(target_os = "linux")]
    fn spawner(pid_file: &std::path::Path, prelude: &str) -> Command {
        sh(&format!("{prelude} sleep 47 & echo $! > {}; wait", pid_file.display()))
    }

    #[cfg(target_os = "linux")]
    fn read_pid(pid_file: &std::path::Path) -> i32 {
        std::fs::read_to_string(pid_file).unwrap().trim().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_reclaims_grandchildren() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pid_file = tmp.path().join("sleep.pid");
        let options = CaptureOptions::new("spawner")
            .timeout(Duration::from_millis(300))
            .kill_grace(Duration::from_millis(200));

        let err = run_captured(spawner(&pid_file, ""), &options).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        let pid = read_pid(&pid_file);
        assert!(gone_within(pid, Duration::from_secs(5)).await, "sleep {pid} outlived the timeout");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_group_that_ignores_sigterm() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pid_file = tmp.path().join("sleep.pid");
        let options = CaptureOptions::new("stubborn")
            .timeout(Duration::from_millis(300))
            .kill_grace(Duration::from_millis(200));

        let start = Instant::now();
        let err = run_captured(spawner(&pid_file, "trap '' TERM;"), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
        let pid = read_pid(&pid_file);
        assert!(gone_within(pid, Duration::from_secs(5)).await, "sleep {pid} survived SIGKILL");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_the_call_reclaims_the_group() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pid_file = tmp.path().join("sleep.pid");
        let options = CaptureOptions::new("abandoned");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(300),
            run_captured(spawner(&pid_file, ""), &options),
        )
        .await;
        assert!(abandoned.is_err());

        let pid = read_pid(&pid_file);
        assert!(gone_within(pid, Duration::from_secs(5)).await, "sleep {pid} outlived its caller");
    }
}
