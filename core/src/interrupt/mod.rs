//! Context-aware, multi-level CTRL+C handling.

mod context;
mod coordinator;
mod state;

pub use context::InterruptContext;
pub use coordinator::{InterruptAction, InterruptCallback, InterruptCoordinator, ProcessingGuard};
pub use state::InterruptState;
