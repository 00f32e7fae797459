// Library exports for integration tests and reusable components

pub mod api;
pub mod app_context;
pub mod config;
pub mod gallery;
pub mod host;
pub mod models;
pub mod realtime;
pub mod session;
pub mod transcode;
pub mod upload;

// Re-export the wired context at crate root for easier access
pub use app_context::AppContext;

/// Install the default log subscriber. Embedding applications call this once
/// at startup; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .try_init();
}
