use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

pub const DEFAULT_CONFIG_FILE: &str = "aris.toml";

/// Loads `aris.toml` from the working directory, then the user config dir,
/// falling back to defaults. Environment overrides are applied last.
pub fn load_default() -> Result<AppConfig, ConfigError> {
    let mut cfg = match default_config_path() {
        Some(path) => read_config(&path)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let mut cfg = read_config(path.as_ref())?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("aris").join(DEFAULT_CONFIG_FILE))
        .filter(|p| p.exists())
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    let cli_path = non_empty_env("ARIS_CLI_PATH").or_else(|| non_empty_env("CLAUDE_CLI_PATH"));
    if let Some(v) = cli_path {
        cfg.executor.cli_path = v;
    }

    if let Some(v) = non_empty_env("ARIS_READ_POLL_MS") {
        match v.parse::<u64>() {
            Ok(ms) => cfg.executor.read_poll_ms = ms,
            Err(_) => tracing::warn!(
                target: "aris.config",
                value = %v,
                "ignoring invalid ARIS_READ_POLL_MS"
            ),
        }
    }

    if let Some(v) = non_empty_env("ARIS_INTERRUPT_RESET_SECS") {
        match v.parse::<f64>() {
            Ok(secs) => cfg.interrupt.reset_timeout_secs = secs,
            Err(_) => tracing::warn!(
                target: "aris.config",
                value = %v,
                "ignoring invalid ARIS_INTERRUPT_RESET_SECS"
            ),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aris.toml");
        std::fs::write(
            &path,
            r#"
[executor]
cli_path = "/opt/claude/bin/claude"
read_poll_ms = 250

[interrupt]
reset_timeout_secs = 1.5
"#,
        )
        .unwrap();

        let cfg = read_config(&path).unwrap();
        assert_eq!(cfg.executor.cli_path, "/opt/claude/bin/claude");
        assert_eq!(cfg.executor.read_poll_ms, 250);
        assert_eq!(cfg.executor.chunk_size_bytes, 8 * 1024);
        assert_eq!(cfg.executor.max_chunks, 1_000);
        assert_eq!(cfg.interrupt.reset_timeout_secs, 1.5);
        assert!(cfg.interrupt.show_notices);
        assert_eq!(cfg.assistant.output_format, "stream-json");
        assert_eq!(cfg.assistant.max_turns, 100);
        assert_eq!(cfg.logging.file, "aris_run.log");
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aris.toml");
        std::fs::write(&path, "[executor\ncli_path = ").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn negative_reset_timeout_falls_back_to_default() {
        let cfg = crate::config::InterruptConfig {
            reset_timeout_secs: -1.0,
            show_notices: false,
        };
        assert_eq!(cfg.reset_timeout(), std::time::Duration::from_secs(2));
    }
}
