//! # transferd
//!
//! Background file-transfer engine: durable task records, resumable HTTP
//! downloads/uploads, priority-scheduled concurrency across hosts and
//! groups, parallel chunked downloads, and an exponential-backoff retry
//! controller, all observed through a single update stream.
//!
//! ## Design Philosophy
//!
//! transferd is designed to be:
//! - **Durable** - every task and its progress survive a process restart
//! - **Resumable** - interrupted downloads continue from the last byte,
//!   not from scratch
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to a status/progress stream,
//!   no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use transferd::{Config, Database, TransferEngine};
//! use std::path::Path;
//! use transferd::types::{BaseDirectory, HttpMethod, Task, TaskId, TaskMeta, Updates};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(Path::new(config.database_path())).await?);
//!     let engine = TransferEngine::new(config, db);
//!     engine.start().await?;
//!
//!     // Subscribe to status/progress updates
//!     let mut updates = engine.subscribe_global();
//!     tokio::spawn(async move {
//!         while let Ok(update) = updates.recv().await {
//!             println!("update: {:?}", update);
//!         }
//!     });
//!
//!     engine
//!         .enqueue(Task::Download(TaskMeta {
//!             task_id: TaskId::generate(),
//!             url: "https://example.com/file.zip".to_string(),
//!             url_query_parameters: HashMap::new(),
//!             headers: HashMap::new(),
//!             http_request_method: HttpMethod::Get,
//!             post: None,
//!             base_directory: BaseDirectory::Temporary,
//!             directory: String::new(),
//!             filename: "file.zip".to_string(),
//!             group: "default".to_string(),
//!             updates: Updates::StatusAndProgress,
//!             requires_wifi: false,
//!             retries: 3,
//!             retries_remaining: 3,
//!             allow_pause: true,
//!             priority: 5,
//!             meta_data: HashMap::new(),
//!             display_name: None,
//!             creation_time: 0,
//!             unique: false,
//!         }))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// The transfer engine: scheduler, executor, retry/resume controllers
pub mod engine;
/// Error types
pub mod error;
/// Ambient retry logic with exponential backoff
pub mod retry;
/// Core task, status, and update types
pub mod types;
/// Wire-format parsing and destination-path helpers
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use engine::TransferEngine;
pub use error::{ApiError, DatabaseError, Error, ErrorDetail, Result, ToHttpStatus};
pub use types::{Status, Task, TaskException, TaskId, TaskRecord, Update};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls [`TransferEngine::shutdown`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use transferd::{Config, Database, TransferEngine, run_with_shutdown};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let db = Arc::new(Database::new(Path::new(config.database_path())).await?);
///     let engine = TransferEngine::new(config, db);
///     engine.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: TransferEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
