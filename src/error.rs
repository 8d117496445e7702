//! Error types for sqles.

use thiserror::Error;

/// The main error type for sqles operations.
#[derive(Debug, Error)]
pub enum SqlesError {
    /// The query text could not be split into tokens.
    #[error("Lex error at position {position}: {message}")]
    Lex { position: usize, message: String },

    /// The token stream does not follow the grammar.
    #[error("Syntax error at position {position}: expected {expected}, found {found}")]
    Syntax {
        position: usize,
        expected: String,
        found: String,
    },

    /// A syntactically valid construct with no query DSL equivalent.
    #[error("Unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// The field-type resolver failed instead of answering.
    #[error("Failed to resolve type of field '{field}': {message}")]
    SchemaResolution { field: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search backend transport or status error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SqlesError {
    /// Create a lex error at the given byte offset.
    pub fn lex(position: usize, message: impl Into<String>) -> Self {
        Self::Lex {
            position,
            message: message.into(),
        }
    }

    /// Create a syntax error at the given byte offset.
    pub fn syntax(position: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported predicate error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedPredicate(message.into())
    }

    /// Create a schema resolution error.
    pub fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaResolution {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for sqles operations.
pub type SqlesResult<T> = Result<T, SqlesError>;
