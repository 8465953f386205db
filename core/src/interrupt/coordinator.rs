use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::InterruptConfig;

use super::context::InterruptContext;
use super::state::InterruptState;

pub type InterruptCallback = Arc<dyn Fn() + Send + Sync>;

/// What a single CTRL+C ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Delivered while a previous signal was still being handled.
    Ignored,
    ExitArmed,
    ExitRequested,
    TtsStopped,
    SttStopped,
    CancelArmed,
    TurnCancelled,
    /// TTS/STT context without a registered callback.
    Unhandled,
}

#[derive(Default)]
struct Callbacks {
    tts: Option<InterruptCallback>,
    stt: Option<InterruptCallback>,
    processing: Option<InterruptCallback>,
    exit: Option<InterruptCallback>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes CTRL+C to a target that depends on the current [`InterruptContext`].
///
/// | context | 1st signal | 2nd signal within the reset window |
/// |---|---|---|
/// | idle | "press again to exit" | exit callback, or the exit token |
/// | tts / stt | callback, count reset | same as 1st |
/// | processing | "press again to interrupt" | cancel the current turn |
///
/// The OS signal is received by a tokio task; the dispatch itself
/// ([`handle_signal_at`](Self::handle_signal_at)) is synchronous and never
/// waits on anything.
pub struct InterruptCoordinator {
    me: Weak<InterruptCoordinator>,
    state: Mutex<InterruptState>,
    callbacks: Mutex<Callbacks>,
    handling: AtomicBool,
    turn_token: Mutex<Option<CancellationToken>>,
    exit_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    tracked: Mutex<Vec<AbortHandle>>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
    show_notices: bool,
}

impl std::fmt::Debug for InterruptCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptCoordinator")
            .field("state", &*lock(&self.state))
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InterruptCoordinator {
    pub fn new(reset_timeout: Duration, show_notices: bool) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(InterruptState::new(reset_timeout)),
            callbacks: Mutex::new(Callbacks::default()),
            handling: AtomicBool::new(false),
            turn_token: Mutex::new(None),
            exit_token: CancellationToken::new(),
            listener: Mutex::new(None),
            tracked: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            show_notices,
        })
    }

    pub fn from_config(cfg: &InterruptConfig) -> Arc<Self> {
        Self::new(cfg.reset_timeout(), cfg.show_notices)
    }

    /// Starts listening for CTRL+C. Must be called inside a tokio runtime;
    /// calling it again while the listener is alive does nothing.
    pub fn initialize(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::warn!(target: "aris.interrupt", "initialize called after shutdown");
            return;
        }
        self.initialized.store(true, Ordering::Release);
        if self.ensure_listener() {
            tracing::info!(target: "aris.interrupt", "multi-level CTRL+C handling installed");
        }
    }

    /// Aborts tracked tasks and the signal listener.
    ///
    /// tokio keeps its SIGINT handler for the rest of the process, so the
    /// caller is expected to exit soon after.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let tracked = std::mem::take(&mut *lock(&self.tracked));
        let mut aborted = 0usize;
        for task in tracked {
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        tracing::info!(target: "aris.interrupt", aborted, "interrupt coordinator shut down");
    }

    /// Switches context. The signal listener is respawned here if it died,
    /// since a context change is the point where the next CTRL+C matters.
    pub fn set_context(&self, context: InterruptContext) {
        let old = std::mem::replace(&mut lock(&self.state).context, context);
        tracing::debug!(target: "aris.interrupt", from = %old, to = %context, "context changed");

        if self.initialized.load(Ordering::Acquire)
            && !self.shut_down.load(Ordering::Acquire)
            && self.ensure_listener()
        {
            tracing::debug!(target: "aris.interrupt", "signal listener reinstalled");
        }
    }

    pub fn context(&self) -> InterruptContext {
        lock(&self.state).context
    }

    pub fn snapshot(&self) -> InterruptState {
        *lock(&self.state)
    }

    pub fn listener_active(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn register_tts_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.callbacks).tts = Some(Arc::new(callback));
        tracing::debug!(target: "aris.interrupt", "TTS interrupt callback registered");
    }

    pub fn register_stt_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.callbacks).stt = Some(Arc::new(callback));
        tracing::debug!(target: "aris.interrupt", "STT interrupt callback registered");
    }

    /// Runs on the second CTRL+C during processing, before the turn is cancelled.
    pub fn register_processing_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.callbacks).processing = Some(Arc::new(callback));
        tracing::debug!(target: "aris.interrupt", "processing interrupt callback registered");
    }

    pub fn register_exit_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.callbacks).exit = Some(Arc::new(callback));
        tracing::debug!(target: "aris.interrupt", "exit callback registered");
    }

    /// Tracks a task to abort on [`shutdown`](Self::shutdown).
    pub fn track_task(&self, task: AbortHandle) {
        let mut tracked = lock(&self.tracked);
        tracked.retain(|t| !t.is_finished());
        tracked.push(task);
    }

    /// Enters [`InterruptContext::Processing`] with a fresh cancellation
    /// token. Dropping the guard goes back to idle.
    pub fn begin_turn(&self) -> ProcessingGuard<'_> {
        let token = CancellationToken::new();
        *lock(&self.turn_token) = Some(token.clone());
        self.set_context(InterruptContext::Processing);
        ProcessingGuard {
            coordinator: self,
            token,
        }
    }

    /// Cancelled when a double CTRL+C at idle finds no exit callback.
    pub fn exit_token(&self) -> CancellationToken {
        self.exit_token.clone()
    }

    pub async fn exit_requested(&self) {
        self.exit_token.cancelled().await
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_token.is_cancelled()
    }

    pub fn handle_signal(&self) -> InterruptAction {
        self.handle_signal_at(Instant::now())
    }

    pub fn handle_signal_at(&self, now: Instant) -> InterruptAction {
        if self.handling.swap(true, Ordering::AcqRel) {
            tracing::debug!(target: "aris.interrupt", "already handling an interrupt, ignoring");
            return InterruptAction::Ignored;
        }
        let _handling = HandlingFlag(&self.handling);

        let (context, count) = {
            let mut state = lock(&self.state);
            let count = state.record_signal(now);
            (state.context, count)
        };
        tracing::info!(target: "aris.interrupt", count, context = %context, "CTRL+C pressed");

        match context {
            InterruptContext::TtsPlaying => {
                self.notice("Stopping speech...");
                let callback = lock(&self.callbacks).tts.clone();
                self.run_and_reset(callback, "TTS", InterruptAction::TtsStopped)
            }
            InterruptContext::SttListening => {
                self.notice("Stopping voice recording...");
                let callback = lock(&self.callbacks).stt.clone();
                self.run_and_reset(callback, "STT", InterruptAction::SttStopped)
            }
            InterruptContext::Processing if count == 1 => {
                tracing::info!(
                    target: "aris.interrupt",
                    "first CTRL+C during processing, press again to interrupt"
                );
                self.notice("Press CTRL+C again to interrupt the assistant...");
                InterruptAction::CancelArmed
            }
            InterruptContext::Processing => {
                self.notice("Interrupting assistant...");
                let callback = lock(&self.callbacks).processing.clone();
                if let Some(callback) = callback {
                    callback();
                }
                match lock(&self.turn_token).clone() {
                    Some(token) => token.cancel(),
                    None => tracing::warn!(
                        target: "aris.interrupt",
                        "processing context without an active turn token"
                    ),
                }
                InterruptAction::TurnCancelled
            }
            InterruptContext::Idle if count == 1 => {
                tracing::info!(target: "aris.interrupt", "first CTRL+C while idle, press again to exit");
                self.notice("Press CTRL+C again to exit...");
                InterruptAction::ExitArmed
            }
            InterruptContext::Idle => {
                tracing::info!(target: "aris.interrupt", "exiting application");
                self.notice("Exiting ARIS...");
                let callback = lock(&self.callbacks).exit.clone();
                match callback {
                    Some(callback) => callback(),
                    None => self.exit_token.cancel(),
                }
                InterruptAction::ExitRequested
            }
        }
    }

    fn run_and_reset(
        &self,
        callback: Option<InterruptCallback>,
        what: &'static str,
        action: InterruptAction,
    ) -> InterruptAction {
        match callback {
            Some(callback) => {
                tracing::info!(target: "aris.interrupt", what, "interrupting");
                callback();
                lock(&self.state).reset_count();
                action
            }
            None => {
                tracing::warn!(target: "aris.interrupt", what, "no interrupt callback registered");
                InterruptAction::Unhandled
            }
        }
    }

    fn notice(&self, msg: &str) {
        if self.show_notices {
            eprintln!("\n{msg}");
        }
    }

    /// Spawns the CTRL+C listener unless one is alive. Returns whether a new
    /// listener was spawned.
    fn ensure_listener(&self) -> bool {
        let mut listener = lock(&self.listener);
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(target: "aris.interrupt", "no tokio runtime, signal listener not installed");
            return false;
        };
        let me = self.me.clone();
        *listener = Some(rt.spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(target: "aris.interrupt", error = %e, "failed to listen for CTRL+C");
                    break;
                }
                let Some(coordinator) = me.upgrade() else {
                    break;
                };
                coordinator.handle_signal();
            }
        }));
        true
    }

    fn end_turn(&self) {
        lock(&self.turn_token).take();
        self.set_context(InterruptContext::Idle);
    }
}

impl Drop for InterruptCoordinator {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

struct HandlingFlag<'a>(&'a AtomicBool);

impl Drop for HandlingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Held for the duration of one turn; restores the idle context on drop.
#[derive(Debug)]
pub struct ProcessingGuard<'a> {
    coordinator: &'a InterruptCoordinator,
    token: CancellationToken,
}

impl ProcessingGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.end_turn();
    }
}
