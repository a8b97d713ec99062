use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The two phases of a session. A session starts in [`GamePhase::Lobby`] and moves to
/// [`GamePhase::InGame`] exactly once, when every player is ready.
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    #[default]
    Lobby,
    InGame,
}

impl Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GamePhase::Lobby => f.write_str("lobby"),
            GamePhase::InGame => f.write_str("in-game"),
        }
    }
}

/// True when there are at least two players and all of them are ready.
pub fn quorum_reached(ready: impl IntoIterator<Item = bool>) -> bool {
    let mut count = 0;
    for r in ready {
        if !r {
            return false;
        }
        count += 1;
    }
    count >= 2
}
