//! Execution and interrupt core of the ARIS assistant CLI.
//!
//! - [`process`] spawns the assistant executable and streams its stdout line by line.
//! - [`interrupt`] routes CTRL+C to the right target depending on what the app is doing.
//! - [`turn`] ties one request/response exchange to both.

pub mod api;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod process;
pub mod turn;
