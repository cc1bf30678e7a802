//! Error types for forumstat
//!
//! This module defines the error types used throughout the forumstat crates.
//! All errors are derived from `thiserror` for convenient error handling
//! and automatic `From` implementations.
//!
//! # Example
//!
//! ```
//! use forumstat_core::error::{ForumstatError, Result};
//!
//! fn example_function() -> Result<()> {
//!     // This will automatically convert io::Error to ForumstatError
//!     let _file = std::fs::read_to_string("nonexistent.txt")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Main error type for forumstat operations
#[derive(Error, Debug)]
pub enum ForumstatError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A storage backend failed to read or write a key
    #[error("Storage error on '{key}': {reason}")]
    Storage {
        /// The key being accessed
        key: String,
        /// What went wrong
        reason: String,
    },

    /// A gap-fill range whose end precedes its start after bucketing
    #[error("Invalid range: end {end} precedes start {start}")]
    InvalidRange {
        /// Bucketed range start (ms)
        start: i64,
        /// Bucketed range end (ms)
        end: i64,
    },

    /// Invalid date format
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid timezone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single page fetch failed
    #[error("Failed to fetch page {page}: {reason}")]
    PageFetch {
        /// 1-based page index
        page: u32,
        /// The error message
        reason: String,
    },

    /// Every retry for a page failed
    #[error("Gave up on page {page} after {attempts} attempts: {source}")]
    CrawlExhausted {
        /// 1-based page index
        page: u32,
        /// Number of attempts made
        attempts: u32,
        /// The last underlying failure
        #[source]
        source: Box<ForumstatError>,
    },
}

/// Convenience type alias for Results in forumstat
///
/// # Example
///
/// ```
/// use forumstat_core::Result;
///
/// fn process_data() -> Result<String> {
///     Ok("Processed successfully".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, ForumstatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ForumstatError::InvalidRange { start: 20, end: 10 };
        assert_eq!(error.to_string(), "Invalid range: end 10 precedes start 20");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ForumstatError = io_error.into();
        assert!(matches!(error, ForumstatError::Io(_)));
    }

    #[test]
    fn test_crawl_exhausted_keeps_cause() {
        let error = ForumstatError::CrawlExhausted {
            page: 3,
            attempts: 4,
            source: Box::new(ForumstatError::PageFetch {
                page: 3,
                reason: "timeout".to_string(),
            }),
        };
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "Failed to fetch page 3: timeout");
    }
}
