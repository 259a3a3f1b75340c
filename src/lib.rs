//! Incident Stream - Main Library
//!
//! Thin umbrella over the workspace: the [`submux`] subscription client plus
//! shared helpers for the binaries.

// Re-export the workspace library for convenience
pub use submux;

pub mod bin_common {
    //! Common utilities for binary executables

    use tracing_subscriber::EnvFilter;

    /// Initialize logging from RUST_LOG, defaulting to info.
    pub fn init_logging() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    /// Read a required environment variable with a helpful error.
    pub fn require_env(name: &str) -> anyhow::Result<String> {
        std::env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set (see .env.example)"))
    }
}
