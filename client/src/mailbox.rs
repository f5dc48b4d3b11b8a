//! Last-write-wins hand-off between the receiver task and the render loop.

use shared::{Color, PlayerId, Position, WorldSnapshot};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected(String),
}

/// Snake handed to this client by the host's `start` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub player_id: PlayerId,
    pub coords: Vec<Position>,
    pub color: Color,
}

#[derive(Debug)]
struct MailboxState {
    latest: Option<WorldSnapshot>,
    assignment: Option<Assignment>,
    status: ConnectionStatus,
}

/// Holds only the newest snapshot. Anything older than what is held is
/// refused, so a reader never goes back in time.
#[derive(Debug)]
pub struct SnapshotMailbox {
    state: Mutex<MailboxState>,
}

impl Default for SnapshotMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotMailbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                latest: None,
                assignment: None,
                status: ConnectionStatus::Connected,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `snapshot` if it is newer than the one held.
    pub fn offer(&self, snapshot: WorldSnapshot) -> bool {
        let mut state = self.lock();
        let is_newer = state
            .latest
            .as_ref()
            .map_or(true, |held| snapshot.tick > held.tick);
        if is_newer {
            state.latest = Some(snapshot);
        }
        is_newer
    }

    pub fn latest(&self) -> Option<WorldSnapshot> {
        self.lock().latest.clone()
    }

    /// Returns the held snapshot if its tick is past `seen`.
    pub fn newer_than(&self, seen: Option<u64>) -> Option<WorldSnapshot> {
        let state = self.lock();
        let snapshot = state.latest.as_ref()?;
        match seen {
            Some(tick) if snapshot.tick <= tick => None,
            _ => Some(snapshot.clone()),
        }
    }

    pub fn set_assignment(&self, assignment: Assignment) {
        self.lock().assignment = Some(assignment);
    }

    pub fn assignment(&self) -> Option<Assignment> {
        self.lock().assignment.clone()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.lock().assignment.as_ref().map(|a| a.player_id)
    }

    /// Records the end of the connection. The first reason sticks.
    pub fn mark_disconnected(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.status == ConnectionStatus::Connected {
            state.status = ConnectionStatus::Disconnected(reason.into());
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().status == ConnectionStatus::Connected
    }
}
