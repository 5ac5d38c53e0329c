//! Pattern error types
//!
//! Errors raised while compiling a phrase pattern. Matching itself never
//! fails: a non-matching message is reported through `PatternMatch::success`.

use thiserror::Error;

/// Errors that can occur while compiling a phrase pattern
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    /// Capture type suffix is neither a known type nor a usable time format
    #[error("Invalid capture type '{kind}' for field '{name}'")]
    InvalidType { name: String, kind: String },

    /// The same capture name appears twice
    #[error("Duplicate capture name: {0}")]
    DuplicateCapture(String),

    /// A `{` without its closing `}`
    #[error("Unterminated capture starting at position {0}")]
    Unterminated(usize),

    /// `{}` or `{:type}`
    #[error("Empty or invalid capture name at position {0}")]
    InvalidName(usize),

    /// The compiled matcher was rejected by the regex engine
    #[error("Pattern compilation failed: {0}")]
    Regex(String),
}

impl From<regex::Error> for PatternError {
    fn from(err: regex::Error) -> Self {
        PatternError::Regex(err.to_string())
    }
}

/// Result type alias for pattern compilation
pub type PatternResult<T> = Result<T, PatternError>;
