mod claude;

pub use claude::{ClaudeFlagPlanner, DEFAULT_ALLOWED_TOOLS};
