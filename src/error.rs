//! Custom error types for rustscholar.
//!
//! Every fallible operation in the library returns `Result<T, ScholarError>`.
//! Field-level extraction misses are not errors; they degrade to absent or
//! default values inside [`crate::fields`].

use thiserror::Error;

/// Main error type for rustscholar operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// The query cannot be sent upstream (no terms and no author, bad ranges)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("HTTP error: {status} from {url}")]
    Http {
        /// Status code returned by the upstream
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// The page structure was not recognised
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Encoding articles into an output format failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScholarError {
    /// True for transport failures and non-success HTTP statuses.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }

    /// True when the upstream page could not be understood.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
