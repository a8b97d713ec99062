use crate::lobby::GamePhase;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Message type '{0}' is not valid in the {1} phase")]
    UnexpectedType(String, GamePhase),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame exceeded max length")]
    FrameLength,
    #[error("Connection reset by peer")]
    ConnectionReset,
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error: {0}")]
    Json(#[from] serde_json::Error),
}
