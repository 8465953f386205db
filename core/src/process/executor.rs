use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;

use super::handle::{terminate, HandleSlot, ProcessHandle, SlotState};
use super::outcome::{normalize_exit, synthetic_error_line, ExitClass};
use super::reader::{LineReader, LineReaderLimits};
use super::runner::{AssistantRunner, ExecuteRequest};

const PROMPT_LOG_LIMIT: usize = 200;
const EXIT_POLL: Duration = Duration::from_millis(25);

/// Spawns the assistant executable and streams its stdout.
///
/// At most one child is alive per executor. The child is owned by an internal
/// slot so [`terminate_current_process`](Self::terminate_current_process) can
/// be called from the interrupt path while the stream is being read.
#[derive(Debug)]
pub struct ProcessExecutor {
    cli_path: String,
    limits: LineReaderLimits,
    read_poll: Duration,
    stderr_capture_bytes: usize,
    kill_grace: Duration,
    slot: HandleSlot,
    busy: AtomicBool,
    next_run: AtomicU64,
}

impl ProcessExecutor {
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self::from_config(&ExecutorConfig {
            cli_path: cli_path.into(),
            ..ExecutorConfig::default()
        })
    }

    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self {
            cli_path: cfg.cli_path.clone(),
            limits: LineReaderLimits {
                line_limit: cfg.line_limit_bytes,
                chunk_size: cfg.chunk_size_bytes,
                max_chunks: cfg.max_chunks,
            },
            read_poll: cfg.read_poll(),
            stderr_capture_bytes: cfg.stderr_capture_bytes,
            kill_grace: cfg.kill_grace(),
            slot: HandleSlot::default(),
            busy: AtomicBool::new(false),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn cli_path(&self) -> &str {
        &self.cli_path
    }

    pub fn has_active_process(&self) -> bool {
        !self.slot.is_empty()
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.slot.pid()
    }

    /// Streams stdout lines of one assistant run.
    ///
    /// Spawn failures, read failures and non-zero exits are reported as a
    /// single synthetic JSON line at the end of the stream, never as an error.
    pub fn execute(&self, request: ExecuteRequest) -> BoxStream<'_, String> {
        Box::pin(async_stream::stream! {
            let Some(run) = RunGuard::acquire(self) else {
                tracing::warn!(target: "aris.process", "execute called while another run is active");
                yield error_line(&ExecutorError::Busy);
                return;
            };
            let run_id = run.run_id;

            let cli_path = self.cli_path.trim();
            if cli_path.is_empty() {
                tracing::error!(target: "aris.process", "assistant CLI path is empty");
                yield error_line(&ExecutorError::MissingExecutable);
                return;
            }

            let args = request.to_args();
            tracing::info!(
                target: "aris.process",
                run_id,
                command = %loggable_command(cli_path, &args),
                "executing assistant CLI"
            );

            let mut cmd = Command::new(cli_path);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            // Own process group: a terminal CTRL+C reaches the coordinator only.
            #[cfg(unix)]
            cmd.process_group(0);

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    let err = ExecutorError::NotFound { path: cli_path.to_string() };
                    tracing::error!(target: "aris.process", error = %err, "spawn failed");
                    yield error_line(&err);
                    return;
                }
                Err(source) => {
                    let err = ExecutorError::Spawn { path: cli_path.to_string(), source };
                    tracing::error!(target: "aris.process", error = %err, "spawn failed");
                    yield error_line(&err);
                    return;
                }
            };

            let stdout = child.stdout.take();
            let stderr_stop = CancellationToken::new();
            let stderr_task = child.stderr.take().map(|stderr| {
                tokio::spawn(drain_stderr(stderr, self.stderr_capture_bytes, stderr_stop.clone()))
            });
            let pid = child.id();
            self.slot.install(ProcessHandle::new(run_id, child));
            tracing::info!(target: "aris.process", run_id, pid = ?pid, "assistant process started");

            let Some(stdout) = stdout else {
                abort_task(stderr_task);
                yield error_line(&ExecutorError::StreamIo {
                    stream: "stdout",
                    source: std::io::Error::other("stdout pipe missing"),
                });
                return;
            };

            let mut reader = LineReader::new(stdout, self.limits);
            let mut lines_yielded = 0usize;
            let mut stopped_externally = false;

            loop {
                match tokio::time::timeout(self.read_poll, reader.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        let text = line.to_text();
                        if text.is_empty() {
                            continue;
                        }
                        tracing::trace!(target: "aris.process", pid = ?pid, line = %text, "stdout");
                        lines_yielded += 1;
                        yield text;
                        if !self.slot.holds(run_id) {
                            stopped_externally = true;
                            break;
                        }
                    }
                    Ok(Ok(None)) => {
                        tracing::debug!(target: "aris.process", pid = ?pid, lines_yielded, "stdout EOF");
                        break;
                    }
                    Ok(Err(source)) => {
                        if !self.slot.holds(run_id) {
                            stopped_externally = true;
                            break;
                        }
                        let err = ExecutorError::StreamIo { stream: "stdout", source };
                        tracing::error!(target: "aris.process", pid = ?pid, error = %err, "stdout read failed");
                        if let Some(handle) = self.slot.take_if(run_id) {
                            terminate(handle, self.kill_grace);
                        }
                        abort_task(stderr_task);
                        yield error_line(&err);
                        return;
                    }
                    Err(_) => match self.slot.state(run_id) {
                        SlotState::Running => continue,
                        SlotState::Cleared => {
                            stopped_externally = true;
                            break;
                        }
                        SlotState::Exited(status) => {
                            tracing::debug!(
                                target: "aris.process",
                                pid = ?pid,
                                exit_code = normalize_exit(status),
                                "process exited while stdout stayed open"
                            );
                            break;
                        }
                    },
                }
            }

            if stopped_externally {
                tracing::info!(target: "aris.process", pid = ?pid, lines_yielded, "process handle cleared, stream stopped");
                abort_task(stderr_task);
                return;
            }

            let stderr_text = self.collect_stderr(run_id, stderr_task, &stderr_stop, pid).await;
            if stderr_text.is_empty() {
                tracing::debug!(target: "aris.process", pid = ?pid, "no stderr output");
            } else {
                tracing::warn!(target: "aris.process", pid = ?pid, stderr = %stderr_text, "assistant stderr");
            }

            let status = match self.wait_for_exit(run_id).await {
                Some(Ok(status)) => status,
                Some(Err(source)) => {
                    let err = ExecutorError::Wait(source);
                    tracing::error!(target: "aris.process", pid = ?pid, error = %err, "wait failed");
                    yield error_line(&err);
                    return;
                }
                None => {
                    tracing::info!(target: "aris.process", pid = ?pid, "process terminated before exit was observed");
                    return;
                }
            };

            let code = normalize_exit(status);
            let class = ExitClass::classify(code, lines_yielded, &stderr_text);
            match &class {
                ExitClass::ProcessError { .. } => tracing::error!(
                    target: "aris.process",
                    pid = ?pid,
                    exit_code = code,
                    "assistant CLI exited with non-zero status"
                ),
                ExitClass::CleanEmpty => tracing::info!(
                    target: "aris.process",
                    pid = ?pid,
                    "assistant CLI produced no output and exited cleanly"
                ),
                ExitClass::Success => tracing::info!(
                    target: "aris.process",
                    pid = ?pid,
                    exit_code = code,
                    lines_yielded,
                    "assistant CLI finished"
                ),
            }
            if let Some(line) = class.trailer() {
                yield line;
            }
            drop(run);
        })
    }

    /// Sends a terminate signal to the live child and clears the handle.
    ///
    /// Never waits, so it is safe to call from the interrupt path. Calling it
    /// with nothing running is a no-op.
    pub fn terminate_current_process(&self) {
        match self.slot.take() {
            Some(handle) => terminate(handle, self.kill_grace),
            None => tracing::debug!(target: "aris.process", "terminate requested with no active process"),
        }
    }

    /// Waits for the stderr drain while the child runs. Once the child is
    /// gone the drain gets one more poll interval, then it is stopped and the
    /// partial capture is used: a descendant may still hold the pipe open.
    async fn collect_stderr(
        &self,
        run_id: u64,
        task: Option<JoinHandle<std::io::Result<String>>>,
        stop: &CancellationToken,
        pid: Option<u32>,
    ) -> String {
        let Some(mut task) = task else {
            return String::new();
        };
        let mut child_gone = false;
        let joined = loop {
            match tokio::time::timeout(self.read_poll, &mut task).await {
                Ok(joined) => break joined,
                Err(_) if child_gone => {
                    tracing::debug!(
                        target: "aris.process",
                        pid = ?pid,
                        "stderr still open after exit, keeping partial capture"
                    );
                    stop.cancel();
                    break task.await;
                }
                Err(_) => child_gone = !matches!(self.slot.state(run_id), SlotState::Running),
            }
        };
        match joined {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(target: "aris.process", pid = ?pid, error = %e, "stderr read failed");
                String::new()
            }
            Err(e) => {
                tracing::warn!(target: "aris.process", pid = ?pid, error = %e, "stderr task failed");
                String::new()
            }
        }
    }

    /// Polls the slot until the child exits. `None` means the handle was
    /// cleared by a terminate first.
    async fn wait_for_exit(&self, run_id: u64) -> Option<std::io::Result<ExitStatus>> {
        loop {
            match self.slot.state(run_id) {
                SlotState::Cleared => return None,
                SlotState::Exited(status) => {
                    self.slot.take_if(run_id);
                    return Some(Ok(status));
                }
                SlotState::Running => tokio::time::sleep(EXIT_POLL).await,
            }
        }
    }
}

impl AssistantRunner for ProcessExecutor {
    fn execute(&self, request: ExecuteRequest) -> BoxStream<'_, String> {
        ProcessExecutor::execute(self, request)
    }

    fn terminate_current_process(&self) {
        ProcessExecutor::terminate_current_process(self)
    }
}

/// Marks the executor busy for one run. Dropping it (stream finished or
/// dropped early) terminates a child the run still owns.
struct RunGuard<'a> {
    executor: &'a ProcessExecutor,
    run_id: u64,
}

impl<'a> RunGuard<'a> {
    fn acquire(executor: &'a ProcessExecutor) -> Option<Self> {
        executor
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let run_id = executor.next_run.fetch_add(1, Ordering::Relaxed);
        Some(Self { executor, run_id })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.executor.slot.take_if(self.run_id) {
            tracing::info!(
                target: "aris.process",
                pid = ?handle.pid(),
                "output stream dropped with process still running"
            );
            terminate(handle, self.executor.kill_grace);
        }
        self.executor.busy.store(false, Ordering::Release);
    }
}

fn error_line(err: &ExecutorError) -> String {
    synthetic_error_line(&err.to_string(), None)
}

fn abort_task<T>(task: Option<JoinHandle<T>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn drain_stderr<R: AsyncRead + Unpin>(
    mut stderr: R,
    cap: usize,
    stop: CancellationToken,
) -> std::io::Result<String> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 8 * 1024];
    let mut discarded = 0usize;
    loop {
        let n = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            read = stderr.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }
        let keep = n.min(cap.saturating_sub(captured.len()));
        captured.extend_from_slice(&buf[..keep]);
        discarded += n - keep;
    }
    if discarded > 0 {
        tracing::debug!(target: "aris.process", discarded, cap, "stderr capture truncated");
    }
    Ok(String::from_utf8_lossy(&captured).trim().to_string())
}

/// Shell-like rendering of the command for logs, with the prompt escaped and
/// shortened.
fn loggable_command(cli_path: &str, args: &[String]) -> String {
    let mut parts = vec![quote_if_spaced(cli_path)];
    let mut after_prompt_flag = false;
    for arg in args {
        if after_prompt_flag {
            let escaped = arg.replace('\n', "\\n").replace('\r', "\\r");
            let shown = if escaped.chars().count() > PROMPT_LOG_LIMIT {
                let head: String = escaped.chars().take(PROMPT_LOG_LIMIT).collect();
                format!("{head}... (prompt truncated)")
            } else {
                escaped
            };
            parts.push(format!("'{shown}'"));
        } else {
            parts.push(quote_if_spaced(arg));
        }
        after_prompt_flag = arg == "-p";
    }
    parts.join(" ")
}

fn quote_if_spaced(s: &str) -> String {
    if s.contains(' ') {
        format!("'{s}'")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::Value;

    #[test]
    fn terminate_without_process_is_a_noop() {
        let exec = ProcessExecutor::new("claude");
        exec.terminate_current_process();
        exec.terminate_current_process();
        assert!(!exec.has_active_process());
        assert_eq!(exec.current_pid(), None);
    }

    #[tokio::test]
    async fn empty_cli_path_yields_one_error_line() {
        let exec = ProcessExecutor::new("   ");
        let lines: Vec<String> = exec.execute(ExecuteRequest::new("hi")).collect().await;
        assert_eq!(lines.len(), 1);
        let v: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(v["type"], "error");
        assert!(v["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Internal CLI command error"));
        assert!(!exec.has_active_process());
    }

    #[tokio::test]
    async fn second_execute_while_busy_is_rejected() {
        let exec = ProcessExecutor::new("claude");
        let _held = RunGuard::acquire(&exec).unwrap();
        let lines: Vec<String> = exec.execute(ExecuteRequest::new("hi")).collect().await;
        assert_eq!(lines.len(), 1);
        let v: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(
            v["error"]["message"],
            "executor busy: another assistant process is already running"
        );
    }

    #[test]
    fn run_guard_releases_busy_flag_on_drop() {
        let exec = ProcessExecutor::new("claude");
        let first = RunGuard::acquire(&exec).unwrap();
        assert!(RunGuard::acquire(&exec).is_none());
        let first_id = first.run_id;
        drop(first);
        let second = RunGuard::acquire(&exec).unwrap();
        assert_ne!(first_id, second.run_id);
    }

    #[test]
    fn long_prompts_are_escaped_and_truncated_in_logs() {
        let prompt = format!("line1\nline2{}", "x".repeat(300));
        let args = vec!["-p".to_string(), prompt, "--verbose".to_string()];
        let rendered = loggable_command("/opt/my tools/claude", &args);
        assert!(rendered.starts_with("'/opt/my tools/claude' -p 'line1\\nline2"));
        assert!(rendered.contains("... (prompt truncated)' --verbose"));
    }

    #[tokio::test]
    async fn stderr_capture_is_bounded() {
        let input = vec![b'e'; 10_000];
        let text = drain_stderr(input.as_slice(), 100, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text.len(), 100);
    }

    #[tokio::test]
    async fn stopped_stderr_drain_keeps_partial_capture() {
        let (mut writer, reader) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"partial warning")
            .await
            .unwrap();
        let stop = CancellationToken::new();
        let task = tokio::spawn(drain_stderr(reader, 1024, stop.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // `writer` stays open, so only the stop ends the drain.
        stop.cancel();
        let text = task.await.unwrap().unwrap();
        assert_eq!(text, "partial warning");
        drop(writer);
    }
}
