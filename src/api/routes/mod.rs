//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] — The command surface (§4.9): enqueue, pause, resume, cancel, reset, queries
//! - [`config`] — Configuration, including the simulated network-status probe
//! - [`system`] — Health, events, OpenAPI, shutdown

mod config;
mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` continues to work
pub use config::*;
pub use system::*;
pub use tasks::*;
