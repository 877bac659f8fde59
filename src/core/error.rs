//! Error types for terrain streaming

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No evictable atlas slot for chunk {chunk}")]
    NoCapacity { chunk: u32 },

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("Invalid terrain data: {0}")]
    InvalidTerrain(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Atlas error: {0}")]
    Atlas(String),

    #[error("Physics error: {0}")]
    Physics(String),
}
