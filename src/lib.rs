//! Directory-Sweep: a prefix-expanding crawler for a health-professional directory
//!
//! This crate discovers directory records by searching alphabetic prefixes,
//! splitting any prefix whose result set hits the site's retrieval ceiling into
//! longer child prefixes, and storing every record it reaches exactly once.

pub mod config;
pub mod crawler;
pub mod output;
pub mod prefix;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Directory-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Prefix error: {0}")]
    Prefix(#[from] prefix::PrefixError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PrefixState,
        to: state::PrefixState,
    },

    /// A frontier or dedup guarantee was broken; global coverage can no longer be trusted
    #[error("Crawl invariant violated: {0}")]
    InvariantViolation(String),

    /// Detail tabs were requested out of portal order
    #[error("Detail navigation error: {0}")]
    Navigation(#[from] state::NavigationError),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid seed prefix: {0}")]
    InvalidPrefix(#[from] prefix::PrefixError),
}

/// Result type alias for Directory-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, PrefixResult};
pub use prefix::{Alphabet, Prefix};
pub use state::PrefixState;
