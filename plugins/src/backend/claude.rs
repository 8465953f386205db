use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use aris_core::api::AssistantConfig;

/// Built-in tools the assistant may use without asking.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Task",
    "Glob",
    "Grep",
    "LS",
    "Read",
    "Edit",
    "MultiEdit",
    "Write",
    "NotebookRead",
    "NotebookEdit",
    "WebFetch",
    "Batch",
    "TodoRead",
    "TodoWrite",
    "WebSearch",
];

/// Builds the flags that follow `-p <prompt>` on the claude command line.
#[derive(Debug, Clone)]
pub struct ClaudeFlagPlanner {
    cfg: AssistantConfig,
}

impl ClaudeFlagPlanner {
    pub fn new(cfg: AssistantConfig) -> Self {
        Self { cfg }
    }

    /// Flags in the order claude expects them:
    /// output format, verbosity, max turns, prompts, tools, MCP config, extras.
    pub fn plan(&self) -> Vec<String> {
        let mut flags = vec![
            "--output-format".to_string(),
            self.cfg.output_format.clone(),
        ];
        if self.cfg.verbose {
            flags.push("--verbose".to_string());
        }
        flags.push("--max-turns".to_string());
        flags.push(self.cfg.max_turns.to_string());

        if let Some(prompt) = self.cfg.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            flags.push("--system-prompt".to_string());
            flags.push(prompt.to_string());
        }
        if let Some(prompt) = self
            .cfg
            .append_system_prompt
            .as_deref()
            .filter(|p| !p.is_empty())
        {
            flags.push("--append-system-prompt".to_string());
            flags.push(prompt.to_string());
        }

        let tools = self.allowed_tools();
        tracing::info!(target: "aris.plugins", tools = %tools.join(","), "allowed tools");
        if !tools.is_empty() {
            flags.push("--allowedTools".to_string());
            flags.push(tools.join(","));
        }

        if let Some(path) = self.cfg.mcp_config_path.as_deref().filter(|p| !p.is_empty()) {
            match validate_mcp_config(Path::new(path)) {
                Ok(abs) => {
                    tracing::info!(target: "aris.plugins", path = %abs.display(), "using MCP config");
                    flags.push("--mcp-config".to_string());
                    flags.push(abs.display().to_string());
                }
                Err(e) => tracing::warn!(
                    target: "aris.plugins",
                    path = %path,
                    error = %format!("{e:#}"),
                    "skipping --mcp-config"
                ),
            }
        }

        flags.extend(self.cfg.extra_flags.iter().cloned());
        flags
    }

    /// Default tools plus configured ones, de-duplicated and sorted.
    pub fn allowed_tools(&self) -> Vec<String> {
        DEFAULT_ALLOWED_TOOLS
            .iter()
            .map(|t| t.to_string())
            .chain(
                self.cfg
                    .allowed_tools
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            )
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn validate_mcp_config(path: &Path) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolve working directory")?
            .join(path)
    };
    let raw = std::fs::read_to_string(&abs)
        .with_context(|| format!("read MCP config {}", abs.display()))?;
    let v: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse MCP config {}", abs.display()))?;
    match v.get("mcpServers").and_then(|s| s.as_object()) {
        Some(servers) => tracing::debug!(
            target: "aris.plugins",
            servers = ?servers.keys().collect::<Vec<_>>(),
            "MCP servers in config"
        ),
        None => tracing::warn!(
            target: "aris.plugins",
            path = %abs.display(),
            "MCP config has no mcpServers section"
        ),
    }
    Ok(abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_flags_match_claude_stream_mode() {
        let flags = ClaudeFlagPlanner::new(AssistantConfig::default()).plan();
        assert_eq!(
            &flags[..5],
            &["--output-format", "stream-json", "--verbose", "--max-turns", "100"]
        );
        let tools_at = flags.iter().position(|f| f == "--allowedTools").unwrap();
        let tools: Vec<&str> = flags[tools_at + 1].split(',').collect();
        assert_eq!(tools.len(), DEFAULT_ALLOWED_TOOLS.len());
        let mut sorted = tools.clone();
        sorted.sort();
        assert_eq!(tools, sorted);
        assert!(!flags.contains(&"--mcp-config".to_string()));
    }

    #[test]
    fn prompts_tools_and_extras_are_added() {
        let cfg = AssistantConfig {
            verbose: false,
            max_turns: 7,
            system_prompt: Some("be brief".into()),
            append_system_prompt: Some("use metric".into()),
            allowed_tools: vec!["mcp__files__read".into(), "Read".into(), " ".into()],
            extra_flags: vec!["--model".into(), "sonnet".into()],
            ..AssistantConfig::default()
        };
        let flags = ClaudeFlagPlanner::new(cfg).plan();

        assert!(!flags.contains(&"--verbose".to_string()));
        let pos = |f: &str| flags.iter().position(|x| x == f).unwrap();
        assert_eq!(flags[pos("--max-turns") + 1], "7");
        assert_eq!(flags[pos("--system-prompt") + 1], "be brief");
        assert_eq!(flags[pos("--append-system-prompt") + 1], "use metric");
        let tools = &flags[pos("--allowedTools") + 1];
        assert!(tools.contains("mcp__files__read"));
        assert_eq!(tools.split(',').filter(|t| *t == "Read").count(), 1);
        assert_eq!(&flags[flags.len() - 2..], &["--model", "sonnet"]);
    }

    #[test]
    fn existing_mcp_config_is_passed_as_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, r#"{"mcpServers":{"files":{"command":"x"}}}"#).unwrap();

        let cfg = AssistantConfig {
            mcp_config_path: Some(path.display().to_string()),
            ..AssistantConfig::default()
        };
        let flags = ClaudeFlagPlanner::new(cfg).plan();
        let pos = flags.iter().position(|f| f == "--mcp-config").unwrap();
        assert_eq!(flags[pos + 1], path.display().to_string());
    }

    #[test]
    fn missing_or_invalid_mcp_config_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();

        for path in [dir.path().join("absent.json"), bad] {
            let cfg = AssistantConfig {
                mcp_config_path: Some(path.display().to_string()),
                ..AssistantConfig::default()
            };
            let flags = ClaudeFlagPlanner::new(cfg).plan();
            assert!(!flags.contains(&"--mcp-config".to_string()));
        }
    }
}
