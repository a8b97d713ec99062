use crate::lobby::GamePhase;
use crate::player::Color;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Messages produced by the server. Every message is a single JSON object on its own line
/// with a `type` tag, e.g. `{"type":"connect","color":"#ff0000"}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after a connection is admitted.
    Connect { color: Color },
    /// Relayed chat, also used to announce newly connected players.
    Chat { color: Color, message: String },
    /// Every player is ready. Lists the colors of all players in join order.
    StartGame { colors: Vec<Color> },
    /// Periodic synchronization signal while the game is running.
    Tick,
}

/// Messages a client may send while the session is in the lobby.
///
/// Chat is relayed as sent, so its fields are optional and never validated.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyMessage {
    Chat {
        color: Option<String>,
        message: Option<String>,
    },
    Ready,
}

/// Messages a client may send once the game has been started.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameMessage {
    Start,
    /// A move by one player. Only the tag is read, the rest of the line is relayed untouched
    /// and interpreted by the clients.
    PlayerEvent,
}

impl LobbyMessage {
    const TYPES: &'static [&'static str] = &["chat", "ready"];

    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        parse_for_phase(line, GamePhase::Lobby, Self::TYPES)
    }
}

impl GameMessage {
    const TYPES: &'static [&'static str] = &["start", "player_event"];

    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        parse_for_phase(line, GamePhase::InGame, Self::TYPES)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

fn parse_for_phase<T: DeserializeOwned>(
    line: &[u8],
    phase: GamePhase,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let error = match serde_json::from_slice::<T>(line) {
        Ok(message) => return Ok(message),
        Err(e) => e,
    };

    // Tell apart a message that belongs to another phase (or no phase at all) from one that
    // is just broken, so the log says which it was.
    match serde_json::from_slice::<Envelope>(line) {
        Ok(Envelope { kind }) if !known.contains(&kind.as_str()) => {
            Err(ProtocolError::UnexpectedType(kind, phase))
        }
        _ => Err(error.into()),
    }
}
