//! Supervision of the external assistant executable.

mod executor;
mod handle;
mod outcome;
mod reader;
mod runner;

pub use executor::ProcessExecutor;
pub use handle::ProcessHandle;
pub use outcome::{
    normalize_exit, synthetic_error_line, synthetic_status_line, ExitClass,
    STATUS_NO_OUTPUT_CLEAN_EXIT,
};
pub use reader::{LineReader, LineReaderLimits, ReadLine};
pub use runner::{AssistantRunner, ExecuteRequest};
