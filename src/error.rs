// src/error.rs

//! Unified error handling for the crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Page structure did not match what the extractor expects
    #[error("Extraction error for {context}: {message}")]
    Extraction { context: String, message: String },

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },

    /// The committer task stopped before the pipeline drained
    #[error("Committer unavailable: {0}")]
    Committer(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an extraction error with context.
    pub fn extraction(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a committer error.
    pub fn committer(message: impl fmt::Display) -> Self {
        Self::Committer(message.to_string())
    }

    /// Whether the error comes from the store and must stop the run.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Committer(_))
    }
}
