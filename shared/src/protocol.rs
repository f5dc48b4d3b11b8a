//! Logical message schema exchanged between host and clients.

use crate::{Color, Direction, PlayerId, Position, WorldSnapshot};
use serde::{Deserialize, Serialize};

/// Every message carries a `"type"` tag:
///
/// | type | sender |
/// |---|---|
/// | `start` | host |
/// | `board_update` | host |
/// | `direction` | client |
/// | `quit` | client |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Start {
        player_id: PlayerId,
        coords: Vec<Position>,
        color: Color,
    },
    BoardUpdate(WorldSnapshot),
    Direction {
        direction: Direction,
    },
    Quit,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Start { .. } => "start",
            Message::BoardUpdate(_) => "board_update",
            Message::Direction { .. } => "direction",
            Message::Quit => "quit",
        }
    }
}
