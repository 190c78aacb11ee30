//! Error types for weft.

use thiserror::Error;

/// Result type alias using weft's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for weft operations.
///
/// Startup failures (`Creation`, `Link`) are detected synchronously and abort
/// pipeline construction. `Element` errors surface asynchronously on the
/// event bus during playback and tear the pipeline down. Nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// An element factory could not produce an element.
    #[error("element creation failed: {0}")]
    Creation(String),

    /// A link could not be established (missing pad or caps mismatch).
    #[error("link failed: {0}")]
    Link(String),

    /// An element failed while processing.
    #[error("element error: {0}")]
    Element(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
