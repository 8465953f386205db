use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use aris_core::api::{
    AppConfig, InterruptCoordinator, TurnError, TurnEvent, TurnExecutor, TurnRequest, TurnResult,
};
use aris_plugins::factory;

use crate::commands::cli::Args;

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Exit,
    NewSession,
    Empty,
    Prompt(String),
}

fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => ReplCommand::Empty,
        "exit" | "quit" => ReplCommand::Exit,
        "new" => ReplCommand::NewSession,
        _ => ReplCommand::Prompt(trimmed.to_string()),
    }
}

pub async fn run_app(args: Args, cfg: AppConfig) -> Result<i32> {
    let rt = factory::build_runtime(&cfg);
    let coordinator = rt.coordinator.clone();
    let (tx, mut events) = mpsc::unbounded_channel();
    let turns = rt.turns.with_event_sink(tx);

    // Speech is not wired into this binary; the hooks keep every context routable.
    coordinator.register_tts_callback(|| {
        tracing::info!(target: "aris.cli", "TTS interrupt requested, no speech output active");
    });
    coordinator.register_stt_callback(|| {
        tracing::info!(target: "aris.cli", "STT interrupt requested, no recording active");
    });
    coordinator.initialize();

    tracing::info!(
        target: "aris.cli",
        started_at = %chrono::Local::now().to_rfc3339(),
        cli_path = %cfg.executor.cli_path,
        "ARIS session started"
    );

    let mut session = Session {
        id: args.resume.clone().filter(|id| !id.trim().is_empty()),
        flags: rt.flags,
    };

    let code = match args.prompt.as_deref() {
        Some(prompt) => one_shot(&turns, &mut events, &mut session, prompt).await,
        None => repl(&turns, &coordinator, &mut events, &mut session).await,
    };

    coordinator.shutdown();
    tracing::info!(target: "aris.cli", exit_code = code, "ARIS session ended");
    Ok(code)
}

struct Session {
    id: Option<String>,
    flags: Vec<String>,
}

impl Session {
    fn request(&self, prompt: &str) -> TurnRequest {
        TurnRequest::new(prompt)
            .with_flags(self.flags.clone())
            .with_resume(self.id.clone())
    }
}

async fn one_shot(
    turns: &TurnExecutor,
    events: &mut mpsc::UnboundedReceiver<TurnEvent>,
    session: &mut Session,
    prompt: &str,
) -> i32 {
    match run_turn(turns, events, session, prompt).await {
        Some(result) if result.cancelled => EXIT_INTERRUPTED,
        Some(_) => 0,
        None => 1,
    }
}

async fn repl(
    turns: &TurnExecutor,
    coordinator: &Arc<InterruptCoordinator>,
    events: &mut mpsc::UnboundedReceiver<TurnEvent>,
    session: &mut Session,
) -> i32 {
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    let reader = tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match stdin.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(target: "aris.cli", error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    coordinator.track_task(reader.abort_handle());

    println!("ARIS ready. Type 'exit' to quit, 'new' for a fresh session. CTRL+C twice exits.");
    loop {
        print!("You > ");
        if let Err(e) = std::io::stdout().flush() {
            tracing::debug!(target: "aris.cli", error = %e, "stdout flush failed");
        }

        let line = tokio::select! {
            biased;
            _ = coordinator.exit_requested() => {
                println!();
                return EXIT_INTERRUPTED;
            }
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            println!();
            return 0;
        };

        match parse_command(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => return 0,
            ReplCommand::NewSession => {
                session.id = None;
                println!("ARIS < Started a new session.");
            }
            ReplCommand::Prompt(prompt) => {
                run_turn(turns, events, session, &prompt).await;
            }
        }
    }
}

/// Runs one turn, rendering live events as they arrive. `None` means the
/// turn failed and the error was already printed.
async fn run_turn(
    turns: &TurnExecutor,
    events: &mut mpsc::UnboundedReceiver<TurnEvent>,
    session: &mut Session,
    prompt: &str,
) -> Option<TurnResult> {
    let turn = turns.run_turn(session.request(prompt));
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            res = &mut turn => break res,
            Some(event) = events.recv() => render(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&event);
    }

    match outcome {
        Ok(result) => {
            if let Some(id) = &result.session_id {
                session.id = Some(id.clone());
            }
            if result.cancelled {
                eprintln!("ARIS < cancelled by user");
            } else if !result.spoke {
                tracing::info!(target: "aris.cli", "turn finished without assistant text");
            }
            Some(result)
        }
        Err(e) => {
            eprintln!("{}", format_error(&e));
            None
        }
    }
}

fn render(event: &TurnEvent) {
    for line in format_event(event) {
        println!("{line}");
    }
}

fn format_event(event: &TurnEvent) -> Vec<String> {
    match event {
        TurnEvent::AssistantText(text) => vec![format!("ARIS < {}", text.trim())],
        TurnEvent::McpServers { connected, failed } => {
            let mut out = Vec::new();
            if !connected.is_empty() {
                out.push(format!(
                    "MCP > Connected to {} MCP server(s): {}",
                    connected.len(),
                    connected.join(", ")
                ));
            }
            if !failed.is_empty() {
                out.push(format!(
                    "MCP > Failed to connect to {} MCP server(s): {}",
                    failed.len(),
                    failed.join(", ")
                ));
                out.push(
                    "Tip > Check server installation and configuration. Some tools may not be available."
                        .to_string(),
                );
            }
            out
        }
        TurnEvent::SessionId(_) | TurnEvent::Status(_) => Vec::new(),
    }
}

fn format_error(err: &TurnError) -> String {
    match err.details() {
        Some(details) => format!("ARIS < error: {err}: {}", details.replace('\n', " ")),
        None => format!("ARIS < error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repl_commands() {
        assert_eq!(parse_command("  "), ReplCommand::Empty);
        assert_eq!(parse_command("EXIT"), ReplCommand::Exit);
        assert_eq!(parse_command("quit\n"), ReplCommand::Exit);
        assert_eq!(parse_command("new"), ReplCommand::NewSession);
        assert_eq!(
            parse_command("  what is new? "),
            ReplCommand::Prompt("what is new?".into())
        );
    }

    #[test]
    fn mcp_failures_come_with_a_tip() {
        let lines = format_event(&TurnEvent::McpServers {
            connected: vec!["fs".into(), "git".into()],
            failed: vec!["web".into()],
        });
        assert_eq!(
            lines,
            vec![
                "MCP > Connected to 2 MCP server(s): fs, git".to_string(),
                "MCP > Failed to connect to 1 MCP server(s): web".to_string(),
                "Tip > Check server installation and configuration. Some tools may not be available."
                    .to_string(),
            ]
        );
    }

    #[test]
    fn errors_render_on_one_line() {
        let err = TurnError::Assistant {
            message: "CLI process error (code 1)".into(),
            details: Some("boom\ntrace".into()),
        };
        assert_eq!(
            format_error(&err),
            "ARIS < error: CLI process error (code 1): boom trace"
        );
    }

    #[test]
    fn session_request_carries_flags_and_resume() {
        let session = Session {
            id: Some("s1".into()),
            flags: vec!["--verbose".into()],
        };
        let req = session.request("hi");
        assert_eq!(req.resume_id.as_deref(), Some("s1"));
        assert_eq!(req.extra_flags, vec!["--verbose".to_string()]);
    }
}
