//! Types shared by the host and its clients: the grid model, the wire
//! protocol and the newline-delimited JSON framer.

pub mod error;
pub mod framing;
pub mod protocol;

pub use error::{DecodeError, FramingError, ProtocolError, TransportError};
pub use framing::{encode, feed, FrameDecoder, MAX_FRAME_LEN};
pub use protocol::Message;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

pub const GRID_WIDTH: i32 = 80;
pub const GRID_HEIGHT: i32 = 45;
pub const CELL_SIZE: i32 = 20;
pub const DEFAULT_PORT: u16 = 65432;
pub const DEFAULT_TICK_RATE: u32 = 10;
pub const MAX_CONNECTIONS_PER_ORIGIN: usize = 5;

/// Stable player identity assigned by the host on admission. Never reused
/// within one host process.
pub type PlayerId = u32;

/// Heading of a snake. Travels on the wire as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_opposite(self, other: Direction) -> bool {
        self.opposite() == other
    }

    /// Unit step on the grid. `y` grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Down),
            2 => Ok(Direction::Left),
            3 => Ok(Direction::Right),
            other => Err(ProtocolError::Invalid(format!(
                "direction {} is outside 0..=3",
                other
            ))),
        }
    }
}

/// Integer grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Position {
        let (dx, dy) = direction.offset();
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Playfield dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: i32,
    pub height: i32,
}

impl GridSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, pos: Position) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(GRID_WIDTH, GRID_HEIGHT)
    }
}

/// RGB colour, serialized as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u8, pub u8, pub u8);

pub const GREEN: Color = Color(0, 255, 0);
pub const RED: Color = Color(255, 0, 0);
pub const ORANGE: Color = Color(255, 165, 0);
pub const YELLOW: Color = Color(255, 255, 0);
pub const PURPLE: Color = Color(128, 0, 128);
pub const CYAN: Color = Color(0, 255, 255);
pub const PINK: Color = Color(255, 192, 203);
pub const BLUE: Color = Color(0, 0, 255);

pub const PALETTE: [Color; 8] = [GREEN, RED, ORANGE, YELLOW, PURPLE, CYAN, PINK, BLUE];

/// Colour for the `index`-th spawned snake.
pub fn palette_color(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

/// Render-facing state of one live snake. `coords[0]` is the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeState {
    pub id: PlayerId,
    pub coords: Vec<Position>,
    pub color: Color,
    pub direction: Direction,
}

impl SnakeState {
    pub fn head(&self) -> Option<Position> {
        self.coords.first().copied()
    }
}

/// Immutable copy of every live snake at the end of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub snakes: Vec<SnakeState>,
}

impl WorldSnapshot {
    pub fn snake(&self, id: PlayerId) -> Option<&SnakeState> {
        self.snakes.iter().find(|snake| snake.id == id)
    }
}
