use std::io;
use thiserror::Error;

/// Error types for clip, model script and save-state parsing
#[derive(Error, Debug)]
pub enum AnimError {
    /// I/O Error during reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A chunk header or payload could not be interpreted
    #[error("Invalid chunk 0x{id:04X} at offset {offset}")]
    InvalidChunk { id: u16, offset: u64 },

    /// Stream ended before a declared structure was complete
    #[error("Truncated {context}: expected {expected} bytes, got {actual}")]
    Truncated {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Error during parsing
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The asset store has no entry with the requested name
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The model script stream reported an error chunk
    #[error("Model script error: {0}")]
    ScriptError(String),

    /// Save-state version outside the supported range
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),
}

/// Result type using AnimError
pub type Result<T> = std::result::Result<T, AnimError>;
