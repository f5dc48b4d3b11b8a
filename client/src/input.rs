//! Local player input: the single "current intended direction" slot.

use shared::Direction;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What one key means to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Steer(Direction),
    Quit,
}

/// Maps WASD to directions and `q`/Escape to quitting.
pub fn parse_key(key: char) -> Option<KeyCommand> {
    match key.to_ascii_lowercase() {
        'w' => Some(KeyCommand::Steer(Direction::Up)),
        'a' => Some(KeyCommand::Steer(Direction::Left)),
        's' => Some(KeyCommand::Steer(Direction::Down)),
        'd' => Some(KeyCommand::Steer(Direction::Right)),
        'q' | '\u{1b}' => Some(KeyCommand::Quit),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct InputSlot {
    direction: Option<Direction>,
    quit: bool,
}

/// Written by the input device, read once per send tick. Only the latest
/// direction is kept.
#[derive(Debug, Default)]
pub struct LocalInput {
    slot: Mutex<InputSlot>,
}

impl LocalInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InputSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, command: KeyCommand) {
        match command {
            KeyCommand::Steer(direction) => self.set_direction(direction),
            KeyCommand::Quit => self.request_quit(),
        }
    }

    pub fn set_direction(&self, direction: Direction) {
        self.lock().direction = Some(direction);
    }

    /// Takes the pending direction, leaving the slot empty.
    pub fn take_direction(&self) -> Option<Direction> {
        self.lock().direction.take()
    }

    pub fn request_quit(&self) {
        self.lock().quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.lock().quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(parse_key('w'), Some(KeyCommand::Steer(Direction::Up)));
        assert_eq!(parse_key('A'), Some(KeyCommand::Steer(Direction::Left)));
        assert_eq!(parse_key('s'), Some(KeyCommand::Steer(Direction::Down)));
        assert_eq!(parse_key('d'), Some(KeyCommand::Steer(Direction::Right)));
        assert_eq!(parse_key('q'), Some(KeyCommand::Quit));
        assert_eq!(parse_key('x'), None);
    }

    #[test]
    fn test_latest_direction_is_taken_once() {
        let input = LocalInput::new();
        assert!(input.take_direction().is_none());

        input.set_direction(Direction::Up);
        input.set_direction(Direction::Left);
        assert_eq!(input.take_direction(), Some(Direction::Left));
        assert!(input.take_direction().is_none());
    }

    #[test]
    fn test_quit_request() {
        let input = LocalInput::new();
        assert!(!input.quit_requested());
        input.apply(KeyCommand::Quit);
        assert!(input.quit_requested());
    }
}
