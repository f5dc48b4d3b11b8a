//! Bounded input queue between the session readers and the tick loop.
//!
//! Many readers push, one tick drains. When full the oldest event is
//! discarded: a stale direction request is superseded by newer ones anyway.

use log::debug;
use shared::{Direction, PlayerId};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub player: PlayerId,
    pub direction: Direction,
    /// Arrival order across all producers
    pub seq: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<InputEvent>,
    next_seq: u64,
    dropped: u64,
}

#[derive(Debug)]
pub struct InputQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a direction request. Never blocks beyond the short critical
    /// section; returns the event evicted to make room, if any.
    pub fn push(&self, player: PlayerId, direction: Direction) -> Option<InputEvent> {
        let mut state = self.lock();

        let seq = state.next_seq;
        state.next_seq += 1;

        let evicted = if state.events.len() >= self.capacity {
            state.dropped += 1;
            state.events.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            debug!(
                "Input queue full, dropped direction {:?} from player {}",
                old.direction, old.player
            );
        }

        state.events.push_back(InputEvent {
            player,
            direction,
            seq,
        });
        evicted
    }

    /// Atomically empties the queue, returning events in arrival order.
    pub fn drain_all(&self) -> Vec<InputEvent> {
        self.lock().events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Events evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
