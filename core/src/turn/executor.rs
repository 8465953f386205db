use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::TurnError;
use crate::interrupt::InterruptCoordinator;
use crate::process::AssistantRunner;

use super::events::{decode_event, EventKind};
use super::result::{TurnEvent, TurnRequest, TurnResult};

const LINE_PREVIEW_CHARS: usize = 200;

/// Drives one request/response exchange.
///
/// The only component that talks to both the runner and the interrupt
/// coordinator: it enters the processing context, reads the runner's stream,
/// and turns a cancelled turn into a normal [`TurnResult`].
pub struct TurnExecutor {
    runner: Arc<dyn AssistantRunner>,
    coordinator: Arc<InterruptCoordinator>,
    events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl TurnExecutor {
    pub fn new(runner: Arc<dyn AssistantRunner>, coordinator: Arc<InterruptCoordinator>) -> Self {
        Self {
            runner,
            coordinator,
            events: None,
        }
    }

    pub fn with_event_sink(mut self, events: mpsc::UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn coordinator(&self) -> &Arc<InterruptCoordinator> {
        &self.coordinator
    }

    /// Runs one turn.
    ///
    /// Cancellation through the coordinator terminates the child and returns
    /// `Ok` with `cancelled` set. An error event from the stream returns
    /// `Err`. Either way the interrupt context is idle again on return.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResult, TurnError> {
        let span = tracing::info_span!(target: "aris.turn", "turn", turn_id = %Uuid::new_v4());
        self.run_turn_inner(request).instrument(span).await
    }

    async fn run_turn_inner(&self, request: TurnRequest) -> Result<TurnResult, TurnError> {
        let guard = self.coordinator.begin_turn();
        let mut acc = Accumulator::new(request.resume_id.clone(), self.events.as_ref());
        tracing::info!(
            target: "aris.turn",
            resume = request.resume_id.is_some(),
            "turn started"
        );

        let mut stream = self.runner.execute(request.to_execute_request());
        let outcome = loop {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {
                    tracing::info!(target: "aris.turn", "turn cancelled, terminating assistant process");
                    self.runner.terminate_current_process();
                    break Ok(true);
                }
                next = stream.next() => match next {
                    Some(line) => {
                        if let Err(e) = acc.absorb(&line) {
                            break Err(e);
                        }
                    }
                    None => break Ok(false),
                },
            }
        };
        drop(stream);
        drop(guard);

        match outcome {
            Ok(cancelled) => {
                let result = acc.finish(cancelled);
                tracing::info!(
                    target: "aris.turn",
                    cancelled = result.cancelled,
                    spoke = result.spoke,
                    text_len = result.text.len(),
                    "turn finished"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(target: "aris.turn", error = %e, details = ?e.details(), "turn failed");
                Err(e)
            }
        }
    }
}

struct Accumulator<'a> {
    fallback_session: Option<String>,
    session_id: Option<String>,
    text: String,
    spoke: bool,
    events: Option<&'a mpsc::UnboundedSender<TurnEvent>>,
}

impl<'a> Accumulator<'a> {
    fn new(
        fallback_session: Option<String>,
        events: Option<&'a mpsc::UnboundedSender<TurnEvent>>,
    ) -> Self {
        Self {
            fallback_session,
            session_id: None,
            text: String::new(),
            spoke: false,
            events,
        }
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(tx) = self.events {
            // A closed receiver only means nobody is rendering.
            let _ = tx.send(event);
        }
    }

    fn push_text(&mut self, text: String) {
        self.text.push_str(&text);
        self.spoke = true;
        self.emit(TurnEvent::AssistantText(text));
    }

    fn absorb(&mut self, line: &str) -> Result<(), TurnError> {
        let event = match decode_event(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    target: "aris.turn",
                    error = %e,
                    line = %preview(line),
                    "non-JSON line from assistant CLI, skipping"
                );
                return Ok(());
            }
        };

        if let Some(id) = event.session_id {
            if self.session_id.as_deref() != Some(id.as_str()) {
                tracing::debug!(target: "aris.turn", session_id = %id, "session id updated");
                self.emit(TurnEvent::SessionId(id.clone()));
            }
            self.session_id = Some(id);
        }

        match event.kind {
            EventKind::AssistantText(parts) => {
                for part in parts {
                    self.push_text(part);
                }
            }
            EventKind::Result { subtype, text } => {
                if subtype.as_deref() == Some("success") && !self.spoke {
                    if let Some(text) = text {
                        self.push_text(text);
                    }
                }
            }
            EventKind::Error { message, details } => {
                return Err(TurnError::Assistant { message, details });
            }
            EventKind::Status(status) => {
                tracing::info!(target: "aris.turn", status = %status, "assistant status");
                self.emit(TurnEvent::Status(status));
            }
            EventKind::SystemInit { mcp_servers } => {
                if !mcp_servers.is_empty() {
                    let connected = mcp_servers
                        .iter()
                        .filter(|s| s.is_connected())
                        .map(|s| s.name.clone())
                        .collect();
                    let failed = mcp_servers
                        .iter()
                        .filter(|s| s.is_failed())
                        .map(|s| s.name.clone())
                        .collect();
                    self.emit(TurnEvent::McpServers { connected, failed });
                }
            }
            EventKind::Other(kind) => {
                tracing::trace!(target: "aris.turn", kind = %kind, "ignoring event");
            }
        }
        Ok(())
    }

    fn finish(self, cancelled: bool) -> TurnResult {
        TurnResult {
            session_id: self.session_id.or(self.fallback_session),
            text: self.text,
            spoke: self.spoke,
            cancelled,
        }
    }
}

fn preview(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() > LINE_PREVIEW_CHARS {
        let head: String = line.chars().take(LINE_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptContext;
    use crate::process::ExecuteRequest;
    use crate::turn::wrap_user_message;
    use futures::stream::BoxStream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct FakeRunner {
        lines: Vec<String>,
        hang_after: bool,
        terminations: AtomicUsize,
        requests: Mutex<Vec<ExecuteRequest>>,
    }

    impl FakeRunner {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                lines: lines.iter().map(|s| s.to_string()).collect(),
                hang_after: false,
                terminations: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn hanging(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                lines: lines.iter().map(|s| s.to_string()).collect(),
                hang_after: true,
                terminations: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl AssistantRunner for FakeRunner {
        fn execute(&self, request: ExecuteRequest) -> BoxStream<'_, String> {
            self.requests.lock().unwrap().push(request);
            let lines = self.lines.clone();
            let hang = self.hang_after;
            Box::pin(async_stream::stream! {
                for line in lines {
                    yield line;
                }
                if hang {
                    futures::future::pending::<()>().await;
                }
            })
        }

        fn terminate_current_process(&self) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator() -> Arc<InterruptCoordinator> {
        InterruptCoordinator::new(Duration::from_secs(2), false)
    }

    fn text_line(text: &str) -> String {
        serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": text}]}
        })
        .to_string()
    }

    #[tokio::test]
    async fn fragments_are_concatenated_and_latest_session_wins() {
        let first = text_line("Hello, ");
        let second = text_line("world");
        let runner = FakeRunner::new(&[
            r#"{"type":"system","subtype":"init","session_id":"s1"}"#,
            first.as_str(),
            "garbage that is not json",
            second.as_str(),
            r#"{"type":"result","subtype":"success","result":"ignored","session_id":"s2"}"#,
        ]);
        let turn = TurnExecutor::new(runner.clone(), coordinator());

        let result = turn.run_turn(TurnRequest::new("hi")).await.unwrap();
        assert_eq!(
            result,
            TurnResult {
                session_id: Some("s2".into()),
                text: "Hello, world".into(),
                spoke: true,
                cancelled: false,
            }
        );
        assert_eq!(runner.terminations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn result_event_is_used_when_nothing_was_spoken() {
        let runner = FakeRunner::new(&[
            r#"{"type":"result","subtype":"success","result":"final answer"}"#,
        ]);
        let turn = TurnExecutor::new(runner, coordinator());
        let result = turn.run_turn(TurnRequest::new("hi")).await.unwrap();
        assert_eq!(result.text, "final answer");
        assert!(result.spoke);
    }

    #[tokio::test]
    async fn non_success_result_is_not_spoken() {
        let runner = FakeRunner::new(&[
            r#"{"type":"result","subtype":"error_max_turns","result":"partial"}"#,
        ]);
        let turn = TurnExecutor::new(runner, coordinator());
        let result = turn.run_turn(TurnRequest::new("hi")).await.unwrap();
        assert_eq!(result.text, "");
        assert!(!result.spoke);
    }

    #[tokio::test]
    async fn resume_id_is_kept_when_no_session_is_announced() {
        let runner = FakeRunner::new(&[r#"{"type":"status","status":"no_output_clean_exit"}"#]);
        let turn = TurnExecutor::new(runner.clone(), coordinator());
        let result = turn
            .run_turn(TurnRequest::new("again").with_resume(Some("prev".into())))
            .await
            .unwrap();
        assert_eq!(result.session_id.as_deref(), Some("prev"));

        let requests = runner.requests.lock().unwrap();
        assert_eq!(requests[0].resume_id.as_deref(), Some("prev"));
        assert_eq!(requests[0].prompt, wrap_user_message("again"));
    }

    #[tokio::test]
    async fn error_event_fails_the_turn_and_restores_idle() {
        let coord = coordinator();
        let runner = FakeRunner::new(&[
            r#"{"type":"error","error":{"message":"CLI process error (code 1)","details":"boom"}}"#,
        ]);
        let turn = TurnExecutor::new(runner, coord.clone());

        let err = turn.run_turn(TurnRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "CLI process error (code 1)");
        assert_eq!(err.details(), Some("boom"));
        assert_eq!(coord.context(), InterruptContext::Idle);
    }

    #[tokio::test]
    async fn executor_stream_failure_surfaces_as_assistant_error() {
        let failure = crate::process::synthetic_error_line(
            "Error reading assistant CLI stdout: broken pipe",
            None,
        );
        let partial = text_line("half an ans");
        let runner = FakeRunner::new(&[partial.as_str(), failure.as_str()]);
        let turn = TurnExecutor::new(runner, coordinator());

        let err = turn.run_turn(TurnRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "Error reading assistant CLI stdout: broken pipe");
        assert_eq!(err.details(), None);
    }

    #[tokio::test]
    async fn live_events_are_forwarded() {
        let first = text_line("hi there");
        let runner = FakeRunner::new(&[
            r#"{"type":"system","subtype":"init","session_id":"s1","mcp_servers":[{"name":"fs","status":"connected"},{"name":"web","status":"failed"}]}"#,
            first.as_str(),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let turn = TurnExecutor::new(runner, coordinator()).with_event_sink(tx);
        turn.run_turn(TurnRequest::new("hi")).await.unwrap();
        drop(turn);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(
            events,
            vec![
                TurnEvent::SessionId("s1".into()),
                TurnEvent::McpServers {
                    connected: vec!["fs".into()],
                    failed: vec!["web".into()],
                },
                TurnEvent::AssistantText("hi there".into()),
            ]
        );
    }

    #[tokio::test]
    async fn double_interrupt_cancels_and_keeps_partial_text() {
        let coord = coordinator();
        let fragment = text_line("partial answer");
        let runner = FakeRunner::hanging(&[fragment.as_str()]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let turn = TurnExecutor::new(runner.clone(), coord.clone()).with_event_sink(tx);

        let running = tokio::spawn(async move { turn.run_turn(TurnRequest::new("hi")).await });

        assert_eq!(
            rx.recv().await,
            Some(TurnEvent::AssistantText("partial answer".into()))
        );
        assert_eq!(coord.context(), InterruptContext::Processing);

        let t0 = Instant::now();
        coord.handle_signal_at(t0);
        coord.handle_signal_at(t0 + Duration::from_millis(100));

        let result = running.await.unwrap().unwrap();
        assert_eq!(
            result,
            TurnResult {
                session_id: None,
                text: "partial answer".into(),
                spoke: true,
                cancelled: true,
            }
        );
        assert_eq!(runner.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(coord.context(), InterruptContext::Idle);
    }

    #[tokio::test]
    async fn single_interrupt_does_not_cancel() {
        let coord = coordinator();
        let runner = FakeRunner::new(&[]);
        let turn = TurnExecutor::new(runner.clone(), coord.clone());
        coord.handle_signal_at(Instant::now());
        let result = turn.run_turn(TurnRequest::new("hi")).await.unwrap();
        assert!(!result.cancelled);
        assert_eq!(runner.terminations.load(Ordering::SeqCst), 0);
    }
}
