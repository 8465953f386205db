//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `aris_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from, AppConfig, AssistantConfig, ExecutorConfig, InterruptConfig,
    LoggingConfig,
};
pub use crate::error::{ConfigError, ExecutorError, TurnError};
pub use crate::interrupt::{
    InterruptAction, InterruptCallback, InterruptContext, InterruptCoordinator, InterruptState,
    ProcessingGuard,
};
pub use crate::process::{
    AssistantRunner, ExecuteRequest, LineReader, LineReaderLimits, ProcessExecutor, ReadLine,
};
pub use crate::turn::{
    decode_event, wrap_user_message, EventKind, StreamEvent, TurnEvent, TurnExecutor,
    TurnRequest, TurnResult,
};
