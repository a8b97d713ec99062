pub use error::{FrameError, ProtocolError};
pub use message::{GameMessage, LobbyMessage, ServerMessage};

pub mod connection;
mod error;
mod message;
