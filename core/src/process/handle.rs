use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Child;

use super::outcome::normalize_exit;

/// The one live child process owned by a [`ProcessExecutor`](super::ProcessExecutor).
#[derive(Debug)]
pub struct ProcessHandle {
    run_id: u64,
    pid: Option<u32>,
    started_at: Instant,
    child: Child,
}

impl ProcessHandle {
    pub(crate) fn new(run_id: u64, child: Child) -> Self {
        Self {
            run_id,
            pid: child.id(),
            started_at: Instant::now(),
            child,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn into_child(self) -> Child {
        self.child
    }
}

/// Liveness of the child held in a [`HandleSlot`], as seen by the read loop.
#[derive(Debug)]
pub(crate) enum SlotState {
    /// The slot no longer holds this run's process: somebody terminated it.
    Cleared,
    Running,
    Exited(ExitStatus),
}

/// Shared, mutex-protected slot for the current [`ProcessHandle`].
///
/// The read loop and `terminate_current_process` may run on different
/// threads, so every access goes through the lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandleSlot {
    inner: Arc<Mutex<Option<ProcessHandle>>>,
}

impl HandleSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ProcessHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn install(&self, handle: ProcessHandle) {
        let mut slot = self.lock();
        if let Some(stale) = slot.take() {
            tracing::warn!(
                target: "aris.process",
                pid = ?stale.pid,
                "replacing a process handle that was never cleared"
            );
        }
        *slot = Some(handle);
    }

    pub(crate) fn take(&self) -> Option<ProcessHandle> {
        self.lock().take()
    }

    /// Takes the handle only if it still belongs to `run_id`.
    pub(crate) fn take_if(&self, run_id: u64) -> Option<ProcessHandle> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|h| h.run_id == run_id) {
            slot.take()
        } else {
            None
        }
    }

    pub(crate) fn holds(&self, run_id: u64) -> bool {
        self.lock().as_ref().is_some_and(|h| h.run_id == run_id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.lock().as_ref().and_then(|h| h.pid)
    }

    pub(crate) fn state(&self, run_id: u64) -> SlotState {
        let mut slot = self.lock();
        match slot.as_mut() {
            Some(handle) if handle.run_id == run_id => match handle.child.try_wait() {
                Ok(Some(status)) => SlotState::Exited(status),
                Ok(None) => SlotState::Running,
                Err(e) => {
                    tracing::debug!(
                        target: "aris.process",
                        pid = ?handle.pid,
                        error = %e,
                        "try_wait failed, assuming child is still running"
                    );
                    SlotState::Running
                }
            },
            _ => SlotState::Cleared,
        }
    }
}

/// Sends a terminate signal to `handle` without waiting for it.
///
/// The handle is consumed, so the caller's slot is already cleared. If a
/// tokio runtime is available, a reaper task escalates to a forced kill when
/// the child is still alive after `grace`.
pub(crate) fn terminate(mut handle: ProcessHandle, grace: Duration) {
    match handle.child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(
                target: "aris.process",
                pid = ?handle.pid,
                exit_code = normalize_exit(status),
                "process already exited, clearing handle"
            );
            return;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(
                target: "aris.process",
                pid = ?handle.pid,
                error = %e,
                "try_wait failed before terminate"
            );
        }
    }

    tracing::info!(
        target: "aris.process",
        pid = ?handle.pid,
        elapsed_ms = handle.elapsed().as_millis() as u64,
        "terminating assistant process"
    );
    send_terminate(&mut handle);
    reap_or_kill(handle, grace);
}

#[cfg(unix)]
fn send_terminate(handle: &mut ProcessHandle) {
    let Some(pid) = handle.pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) only takes integers; the pid came from our own spawn.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::debug!(target: "aris.process", pid, "process already gone");
        } else {
            tracing::warn!(target: "aris.process", pid, error = %err, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(handle: &mut ProcessHandle) {
    if let Err(e) = handle.child.start_kill() {
        tracing::debug!(
            target: "aris.process",
            pid = ?handle.pid,
            error = %e,
            "terminate failed, process probably gone"
        );
    }
}

fn reap_or_kill(handle: ProcessHandle, grace: Duration) {
    let pid = handle.pid;
    let mut child = handle.into_child();

    match tokio::runtime::Handle::try_current() {
        Ok(rt) => {
            rt.spawn(async move {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => tracing::debug!(
                        target: "aris.process",
                        pid = ?pid,
                        exit_code = normalize_exit(status),
                        "terminated process reaped"
                    ),
                    Ok(Err(e)) => tracing::warn!(
                        target: "aris.process",
                        pid = ?pid,
                        error = %e,
                        "failed waiting for terminated process"
                    ),
                    Err(_) => {
                        tracing::warn!(
                            target: "aris.process",
                            pid = ?pid,
                            grace_ms = grace.as_millis() as u64,
                            "process ignored terminate, forcing kill"
                        );
                        if let Err(e) = child.kill().await {
                            tracing::debug!(
                                target: "aris.process",
                                pid = ?pid,
                                error = %e,
                                "forced kill failed"
                            );
                        }
                    }
                }
            });
        }
        Err(_) => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(
                    target: "aris.process",
                    pid = ?pid,
                    error = %e,
                    "forced kill without runtime failed"
                );
            }
        }
    }
}
