use clap::Parser;

use aris_core::api::AppConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "aris", version, about = "Talk to an AI assistant CLI, with CTRL+C that does the right thing")]
pub struct Args {
    /// Path to the assistant executable (overrides config and ARIS_CLI_PATH).
    #[arg(long)]
    pub cli_path: Option<String>,

    /// Config file to load instead of ./aris.toml.
    #[arg(long)]
    pub config: Option<String>,

    /// Also log to the console.
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    #[arg(long)]
    pub log_file: Option<String>,

    /// Continue an existing assistant session.
    #[arg(long)]
    pub resume: Option<String>,

    /// Run a single turn and exit.
    #[arg(long, short = 'p')]
    pub prompt: Option<String>,
}

impl Args {
    /// Command-line values win over the loaded config.
    pub fn apply_to(&self, cfg: &mut AppConfig) {
        if let Some(path) = self.cli_path.as_deref().filter(|p| !p.trim().is_empty()) {
            cfg.executor.cli_path = path.to_string();
        }
        if let Some(file) = self.log_file.as_deref().filter(|f| !f.trim().is_empty()) {
            cfg.logging.file = file.to_string();
        }
        if self.verbose {
            cfg.logging.console = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "aris",
            "--cli-path",
            "/opt/claude",
            "--log-file",
            "/tmp/aris.log",
            "--verbose",
            "--resume",
            "abc",
        ])
        .unwrap();
        let mut cfg = AppConfig::default();
        args.apply_to(&mut cfg);

        assert_eq!(cfg.executor.cli_path, "/opt/claude");
        assert_eq!(cfg.logging.file, "/tmp/aris.log");
        assert!(cfg.logging.console);
        assert_eq!(args.resume.as_deref(), Some("abc"));
        assert!(args.prompt.is_none());
    }

    #[test]
    fn no_flags_keep_config() {
        let args = Args::try_parse_from(["aris", "-p", "hello"]).unwrap();
        let mut cfg = AppConfig::default();
        args.apply_to(&mut cfg);
        assert_eq!(cfg.executor.cli_path, "claude");
        assert!(!cfg.logging.console);
        assert_eq!(args.prompt.as_deref(), Some("hello"));
    }
}
