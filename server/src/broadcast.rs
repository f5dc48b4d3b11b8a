//! Snapshot fan-out to every registered session.

use crate::session::{BroadcastTarget, Frame, SessionId, SessionRegistry};
use log::{debug, warn};
use shared::{encode, FramingError, Message, WorldSnapshot};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// What happened to one `publish` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Sessions whose queue was full this time but stay registered
    pub deferred: usize,
    /// Sessions removed from the registry
    pub dropped: Vec<SessionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    Deferred,
    Dropped,
}

/// Queues frames on session writers without ever waiting on a socket.
/// A session whose writer is gone, or that stays backed up for
/// `max_send_failures` consecutive sends, is removed from the registry.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    max_send_failures: u32,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, max_send_failures: u32) -> Self {
        Self {
            registry,
            max_send_failures: max_send_failures.max(1),
        }
    }

    /// Sends one `board_update` to every session. A failing session never
    /// prevents delivery to the others.
    pub fn publish(&self, snapshot: WorldSnapshot) -> Result<PublishReport, FramingError> {
        let tick = snapshot.tick;
        let frame: Frame = encode(&Message::BoardUpdate(snapshot))?.into();

        let mut report = PublishReport::default();
        for target in self.registry.broadcast_targets() {
            match self.deliver(&target, Arc::clone(&frame)) {
                SendOutcome::Queued => report.delivered += 1,
                SendOutcome::Deferred => report.deferred += 1,
                SendOutcome::Dropped => report.dropped.push(target.id),
            }
        }

        debug!(
            "Tick {}: board update queued for {} sessions ({} deferred, {} dropped)",
            tick,
            report.delivered,
            report.deferred,
            report.dropped.len()
        );
        Ok(report)
    }

    /// Sends a single message to one session.
    pub fn send_to(&self, id: SessionId, message: &Message) -> Result<SendOutcome, FramingError> {
        let frame: Frame = encode(message)?.into();
        Ok(match self.registry.target(id) {
            Some(target) => self.deliver(&target, frame),
            None => SendOutcome::Dropped,
        })
    }

    fn deliver(&self, target: &BroadcastTarget, frame: Frame) -> SendOutcome {
        match target.outbound.try_send(frame) {
            Ok(()) => {
                self.registry.record_send_success(target.id);
                SendOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                let failures = self.registry.record_send_failure(target.id);
                if failures >= self.max_send_failures {
                    warn!(
                        "Session {} ({}) fell {} frames behind, dropping it",
                        target.id, target.addr, failures
                    );
                    self.registry.remove(target.id);
                    SendOutcome::Dropped
                } else {
                    SendOutcome::Deferred
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    "Session {} ({}) connection is gone, dropping it",
                    target.id, target.addr
                );
                self.registry.remove(target.id);
                SendOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{feed, Direction, Position, SnakeState, GREEN};
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn decode(frame: &[u8]) -> Message {
        let (mut results, rest) = feed(frame);
        assert!(rest.is_empty());
        assert_eq!(results.len(), 1);
        results.remove(0).unwrap()
    }

    fn snapshot(tick: u64) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            snakes: vec![SnakeState {
                id: 1,
                coords: vec![Position::new(6, 5), Position::new(5, 5), Position::new(5, 6)],
                color: GREEN,
                direction: Direction::Right,
            }],
        }
    }

    #[test]
    fn test_failed_session_is_removed_and_others_receive() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), 3);

        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        let a = registry.admit(addr(1), tx1).unwrap();
        let b = registry.admit(addr(2), tx2).unwrap();
        let c = registry.admit(addr(3), tx3).unwrap();

        // Session b's writer died.
        drop(rx2);

        let report = broadcaster.publish(snapshot(7)).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, vec![b]);
        assert_eq!(registry.ids(), vec![a, c]);

        for rx in [&mut rx1, &mut rx3] {
            let frame = rx.try_recv().unwrap();
            match decode(&frame) {
                Message::BoardUpdate(received) => assert_eq!(received, snapshot(7)),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn test_backed_up_session_dropped_after_repeated_failures() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), 2);

        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = registry.admit(addr(1), slow_tx).unwrap();
        registry.admit(addr(2), fast_tx).unwrap();

        let first = broadcaster.publish(snapshot(1)).unwrap();
        assert_eq!(first.delivered, 2);

        let second = broadcaster.publish(snapshot(2)).unwrap();
        assert_eq!(second.deferred, 1);
        assert!(registry.contains(slow));

        let third = broadcaster.publish(snapshot(3)).unwrap();
        assert_eq!(third.dropped, vec![slow]);
        assert!(!registry.contains(slow));

        let mut fast_frames = 0;
        while fast_rx.try_recv().is_ok() {
            fast_frames += 1;
        }
        assert_eq!(fast_frames, 3);
    }

    #[test]
    fn test_successful_send_resets_failure_streak() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), 2);

        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.admit(addr(1), tx).unwrap();

        broadcaster.publish(snapshot(1)).unwrap();
        assert_eq!(broadcaster.publish(snapshot(2)).unwrap().deferred, 1);

        rx.try_recv().unwrap();
        assert_eq!(broadcaster.publish(snapshot(3)).unwrap().delivered, 1);

        rx.try_recv().unwrap();
        broadcaster.publish(snapshot(4)).unwrap();
        assert_eq!(broadcaster.publish(snapshot(5)).unwrap().deferred, 1);
        assert!(registry.contains(id));
    }

    #[test]
    fn test_publish_with_no_sessions() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let broadcaster = Broadcaster::new(registry, 3);
        assert_eq!(
            broadcaster.publish(WorldSnapshot::default()).unwrap(),
            PublishReport::default()
        );
    }

    #[test]
    fn test_send_to_single_session() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), 3);

        let (tx, mut rx) = mpsc::channel(4);
        let id = registry.admit(addr(1), tx).unwrap();

        let start = Message::Start {
            player_id: id,
            coords: vec![Position::new(5, 5)],
            color: GREEN,
        };
        assert_eq!(broadcaster.send_to(id, &start).unwrap(), SendOutcome::Queued);
        assert_eq!(decode(&rx.try_recv().unwrap()), start);

        assert_eq!(broadcaster.send_to(99, &start).unwrap(), SendOutcome::Dropped);
    }
}
