// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::services::FetchError;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Upstream API call failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Graph database operation failed
    #[cfg(feature = "graph")]
    #[error("Graph error: {0}")]
    Graph(#[from] neo4rs::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No query in the query set is active
    #[error("No active queries in the query set")]
    EmptyQuerySet,

    /// A query addressed by text does not exist
    #[error("Query not found: {0}")]
    QueryNotFound(String),

    /// Durable state could not be written
    #[error("Failed to persist {path}: {message}")]
    Persistence { path: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a persistence error for the given path.
    pub fn persistence(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error must stop the long-running crawl loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EmptyQuerySet)
    }
}
