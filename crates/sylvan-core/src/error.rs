//! Error types for the chunk subsystem.

use thiserror::Error;

use crate::coords::ChunkKey;

/// Chunk subsystem error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Non-finite or out-of-range input to a sampling function.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected at construction time.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Generation requested for a key that is already pending or ready.
    #[error("Duplicate request for chunk {0}")]
    DuplicateRequest(ChunkKey),

    /// Worker result arrived for a chunk that was evicted in the meantime.
    #[error("Stale commit for chunk {0}")]
    StaleCommit(ChunkKey),

    /// Worker-side failure while generating a chunk.
    #[error("Generation failed for chunk {key}: {reason}")]
    GenerationFailed { key: ChunkKey, reason: String },

    /// I/O error (worker thread spawn)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that are an expected race rather than a fault.
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::StaleCommit(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
