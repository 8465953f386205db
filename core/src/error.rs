use thiserror::Error;

/// Failures inside the process executor.
///
/// These never escape the output stream: the executor renders them as
/// synthetic `{"type":"error",...}` lines.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Internal CLI command error: assistant CLI path is empty or unset.")]
    MissingExecutable,

    #[error("Assistant CLI not found at '{path}'.")]
    NotFound { path: String },

    #[error("Unexpected error running assistant CLI: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executor busy: another assistant process is already running")]
    Busy,

    #[error("Error reading assistant CLI {stream}: {source}")]
    StreamIo {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected error waiting for assistant CLI: {0}")]
    Wait(#[source] std::io::Error),
}

/// Errors surfaced by a turn after the interrupt context is back to idle.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{message}")]
    Assistant {
        message: String,
        details: Option<String>,
    },
}

impl TurnError {
    pub fn details(&self) -> Option<&str> {
        match self {
            TurnError::Assistant { details, .. } => details.as_deref(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
