//! One request/response exchange with the assistant.

mod events;
mod executor;
mod result;

pub use events::{decode_event, EventKind, McpServerStatus, StreamEvent};
pub use executor::TurnExecutor;
pub use result::{wrap_user_message, TurnEvent, TurnRequest, TurnResult};
