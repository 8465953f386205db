use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub interrupt: InterruptConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    /// Upper bound on a single stdout read before the loop re-checks for cancellation.
    #[serde(default = "default_read_poll_ms")]
    pub read_poll_ms: u64,

    /// Longest line accepted by the line-oriented reader before chunked reassembly.
    #[serde(default = "default_line_limit_bytes")]
    pub line_limit_bytes: usize,

    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,

    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    #[serde(default = "default_stderr_capture_bytes")]
    pub stderr_capture_bytes: usize,

    /// How long a terminated child gets before it is killed outright.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_cli_path() -> String {
    "claude".to_string()
}

fn default_read_poll_ms() -> u64 {
    2_000
}

fn default_line_limit_bytes() -> usize {
    64 * 1024
}

fn default_chunk_size_bytes() -> usize {
    8 * 1024
}

fn default_max_chunks() -> usize {
    1_000
}

fn default_stderr_capture_bytes() -> usize {
    64 * 1024
}

fn default_kill_grace_ms() -> u64 {
    3_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            read_poll_ms: default_read_poll_ms(),
            line_limit_bytes: default_line_limit_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
            max_chunks: default_max_chunks(),
            stderr_capture_bytes: default_stderr_capture_bytes(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms.max(1))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptConfig {
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: f64,

    /// Print "press again" style notices to stderr.
    #[serde(default = "default_show_notices")]
    pub show_notices: bool,
}

fn default_reset_timeout_secs() -> f64 {
    2.0
}

fn default_show_notices() -> bool {
    true
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            reset_timeout_secs: default_reset_timeout_secs(),
            show_notices: default_show_notices(),
        }
    }
}

impl InterruptConfig {
    pub fn reset_timeout(&self) -> Duration {
        if self.reset_timeout_secs.is_finite() && self.reset_timeout_secs >= 0.0 {
            Duration::from_secs_f64(self.reset_timeout_secs)
        } else {
            Duration::from_secs_f64(default_reset_timeout_secs())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default = "default_verbose")]
    pub verbose: bool,

    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub append_system_prompt: Option<String>,

    #[serde(default)]
    pub mcp_config_path: Option<String>,

    #[serde(default)]
    pub allowed_tools: Vec<String>,

    #[serde(default)]
    pub extra_flags: Vec<String>,
}

fn default_output_format() -> String {
    "stream-json".to_string()
}

fn default_verbose() -> bool {
    true
}

fn default_max_turns() -> u32 {
    100
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            output_format: default_output_format(),
            verbose: default_verbose(),
            max_turns: default_max_turns(),
            system_prompt: None,
            append_system_prompt: None,
            mcp_config_path: None,
            allowed_tools: Vec::new(),
            extra_flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: String,

    #[serde(default)]
    pub console: bool,
}

fn default_log_file() -> String {
    "aris_run.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            console: false,
        }
    }
}
