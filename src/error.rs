//! Error types for the Galena engine.
//!
//! All fallible operations return [`Result`]. Errors carry one of the engine's
//! exception kinds plus a message and an optional cause chain; the HTTP layer
//! maps kinds to status codes.

use std::io;

use thiserror::Error;

/// The main error type for Galena operations.
#[derive(Error, Debug)]
pub enum GalenaError {
    /// Malformed query DSL, unknown analyzer/filter/tokenizer, ambiguous
    /// query shape.
    #[error("ParsingException: {0}")]
    Parsing(String),

    /// A sub-parser failed beneath a named query kind. Carries the parent
    /// kind tag and the underlying cause.
    #[error("XContentParseException: [{kind}] failed to parse field")]
    XContentParse {
        kind: String,
        #[source]
        cause: Box<GalenaError>,
    },

    /// Type conflict or unparseable value for a declared field type.
    #[error("MappingException: {0}")]
    Mapping(String),

    /// Unknown index or document id.
    #[error("NotFoundException: {0}")]
    NotFound(String),

    /// Shard id out of range, writer open failure, internal invariant broken.
    #[error("RuntimeException: {0}")]
    Runtime(String),

    /// Underlying key-value or object-store error.
    #[error("StorageException: {0}")]
    Storage(String),

    /// Client-initiated cancellation or cascade from a sibling worker.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// I/O errors from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with [`GalenaError`].
pub type Result<T> = std::result::Result<T, GalenaError>;

impl GalenaError {
    /// Create a new parsing error.
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        GalenaError::Parsing(msg.into())
    }

    /// Wrap a cause under a parent query-kind tag.
    pub fn xcontent<S: Into<String>>(kind: S, cause: GalenaError) -> Self {
        GalenaError::XContentParse {
            kind: kind.into(),
            cause: Box::new(cause),
        }
    }

    /// Create a new mapping error.
    pub fn mapping<S: Into<String>>(msg: S) -> Self {
        GalenaError::Mapping(msg.into())
    }

    /// Create a new not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        GalenaError::NotFound(msg.into())
    }

    /// Create a new runtime error.
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        GalenaError::Runtime(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        GalenaError::Storage(msg.into())
    }

    /// Create a new cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        GalenaError::Cancelled(msg.into())
    }

    /// Walk the cause chain and render a human-readable trail.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cur: &dyn std::error::Error = self;
        while let Some(cause) = cur.source() {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            cur = cause;
        }
        out
    }
}
