//! Session registry for connected clients
//!
//! The registry is the only place that holds connection state on the host:
//! - admission with per-origin and total roster limits
//! - monotonically increasing player identities, never reused
//! - the outbound frame queue of every live session
//! - consecutive send failure tracking for slow clients
//!
//! The acceptor, the per-session tasks and the broadcaster all go through
//! these operations; nothing else touches the session map.

use crate::error::AdmissionError;
use log::{debug, info};
use shared::PlayerId;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;

/// Sessions are identified by the player identity they were assigned.
pub type SessionId = PlayerId;

/// One encoded frame, shared by every session it is queued on.
pub type Frame = Arc<[u8]>;

/// Host-side representation of one client connection
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Queue drained by the session's writer task. Closed once the writer
    /// gives up on the connection.
    outbound: mpsc::Sender<Frame>,
    /// Consecutive sends that found the queue full
    send_failures: u32,
}

impl Session {
    fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
            send_failures: 0,
        }
    }

    /// A session is live while its writer still accepts frames.
    pub fn is_live(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// Delivery handle handed out to the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcastTarget {
    pub id: SessionId,
    pub addr: SocketAddr,
    pub outbound: mpsc::Sender<Frame>,
}

#[derive(Debug)]
struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    per_origin: HashMap<IpAddr, usize>,
    next_id: SessionId,
}

/// Thread-safe registry of live sessions
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    max_per_origin: usize,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_per_origin: usize, max_sessions: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                sessions: HashMap::new(),
                per_origin: HashMap::new(),
                next_id: 1,
            }),
            max_per_origin,
            max_sessions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a new connection and assigns it the next player identity.
    ///
    /// Rejects once the originating address already holds
    /// `max_per_origin` sessions or the roster is full. A rejected attempt
    /// leaves no trace in the registry.
    pub fn admit(
        &self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<SessionId, AdmissionError> {
        let mut state = self.lock();
        let origin = addr.ip();

        let from_origin = state.per_origin.get(&origin).copied().unwrap_or(0);
        if from_origin >= self.max_per_origin {
            return Err(AdmissionError::TooManyConnectionsFromOrigin {
                origin,
                limit: self.max_per_origin,
            });
        }
        if state.sessions.len() >= self.max_sessions {
            return Err(AdmissionError::ServerFull {
                limit: self.max_sessions,
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        *state.per_origin.entry(origin).or_insert(0) += 1;
        state.sessions.insert(id, Session::new(id, addr, outbound));

        info!("Session {} admitted from {}", id, addr);
        Ok(id)
    }

    /// Admits a connection and ties its removal to the returned guard.
    pub fn admit_guarded(
        self: &Arc<Self>,
        addr: SocketAddr,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<SessionGuard, AdmissionError> {
        let id = self.admit(addr, outbound)?;
        Ok(SessionGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Removes a session. Returns false if it was already gone, so every
    /// exit path may call this without double-counting the origin.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut state = self.lock();
        let Some(session) = state.sessions.remove(&id) else {
            return false;
        };

        let origin = session.addr.ip();
        if let Some(count) = state.per_origin.get_mut(&origin) {
            *count -= 1;
            if *count == 0 {
                state.per_origin.remove(&origin);
            }
        }

        info!(
            "Session {} from {} removed after {:?}",
            id,
            session.addr,
            session.connected_at.elapsed()
        );
        true
    }

    /// Snapshot of every live session's delivery handle.
    pub fn broadcast_targets(&self) -> Vec<BroadcastTarget> {
        let state = self.lock();
        let mut targets: Vec<BroadcastTarget> = state
            .sessions
            .values()
            .map(|session| BroadcastTarget {
                id: session.id,
                addr: session.addr,
                outbound: session.outbound.clone(),
            })
            .collect();
        targets.sort_by_key(|target| target.id);
        targets
    }

    /// Delivery handle of a single session.
    pub fn target(&self, id: SessionId) -> Option<BroadcastTarget> {
        self.lock().sessions.get(&id).map(|session| BroadcastTarget {
            id: session.id,
            addr: session.addr,
            outbound: session.outbound.clone(),
        })
    }

    /// Counts a send that could not be queued and returns the streak length.
    pub fn record_send_failure(&self, id: SessionId) -> u32 {
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) => {
                session.send_failures += 1;
                debug!(
                    "Session {} send failure streak: {}",
                    id, session.send_failures
                );
                session.send_failures
            }
            None => 0,
        }
    }

    pub fn record_send_success(&self, id: SessionId) {
        if let Some(session) = self.lock().sessions.get_mut(&id) {
            session.send_failures = 0;
        }
    }

    /// Identities of all live sessions in admission order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.lock().sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().sessions.contains_key(&id)
    }

    pub fn is_live(&self, id: SessionId) -> bool {
        self.lock()
            .sessions
            .get(&id)
            .map_or(false, Session::is_live)
    }

    pub fn connections_from(&self, origin: IpAddr) -> usize {
        self.lock().per_origin.get(&origin).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}

/// Removes its session from the registry when dropped, on every exit path
/// of the owning task.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn other_origin(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 2], port))
    }

    fn channel() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(4)
    }

    #[test]
    fn test_admit_assigns_increasing_ids() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        assert_eq!(registry.admit(addr(1000), tx.clone()), Ok(1));
        assert_eq!(registry.admit(addr(1001), tx.clone()), Ok(2));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![1, 2]);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        let first = registry.admit(addr(1000), tx.clone()).unwrap();
        assert!(registry.remove(first));

        let second = registry.admit(addr(1000), tx).unwrap();
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn test_sixth_connection_from_same_origin_is_rejected() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        let results: Vec<_> = (0..6)
            .map(|i| registry.admit(addr(2000 + i), tx.clone()))
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        assert_eq!(
            results[5],
            Err(AdmissionError::TooManyConnectionsFromOrigin {
                origin: addr(0).ip(),
                limit: 5,
            })
        );
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.connections_from(addr(0).ip()), 5);
    }

    #[test]
    fn test_origin_limit_is_per_address() {
        let registry = SessionRegistry::new(1, 8);
        let (tx, _rx) = channel();

        assert!(registry.admit(addr(1), tx.clone()).is_ok());
        assert!(registry.admit(other_origin(1), tx.clone()).is_ok());
        assert!(registry.admit(addr(2), tx).is_err());
    }

    #[test]
    fn test_origin_slot_freed_on_remove() {
        let registry = SessionRegistry::new(1, 8);
        let (tx, _rx) = channel();

        let id = registry.admit(addr(1), tx.clone()).unwrap();
        assert!(registry.admit(addr(2), tx.clone()).is_err());

        registry.remove(id);
        assert_eq!(registry.connections_from(addr(0).ip()), 0);
        assert!(registry.admit(addr(2), tx).is_ok());
    }

    #[test]
    fn test_roster_cap() {
        let registry = SessionRegistry::new(5, 2);
        let (tx, _rx) = channel();

        registry.admit(addr(1), tx.clone()).unwrap();
        registry.admit(other_origin(1), tx.clone()).unwrap();
        assert_eq!(
            registry.admit(other_origin(2), tx),
            Err(AdmissionError::ServerFull { limit: 2 })
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        let id = registry.admit(addr(1), tx).unwrap();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!registry.remove(999));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_removes_session_once() {
        let registry = Arc::new(SessionRegistry::new(5, 8));
        let (tx, _rx) = channel();

        let guard = registry.admit_guarded(addr(1), tx).unwrap();
        let id = guard.id();
        assert!(registry.contains(id));

        // Removal elsewhere first must not break the guard's cleanup.
        registry.remove(id);
        drop(guard);
        assert!(!registry.contains(id));
        assert_eq!(registry.connections_from(addr(0).ip()), 0);
    }

    #[test]
    fn test_broadcast_targets_is_a_snapshot() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        let a = registry.admit(addr(1), tx.clone()).unwrap();
        let b = registry.admit(addr(2), tx).unwrap();

        let targets = registry.broadcast_targets();
        registry.remove(a);

        assert_eq!(targets.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn test_send_failure_streak() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, _rx) = channel();

        let id = registry.admit(addr(1), tx).unwrap();
        assert_eq!(registry.record_send_failure(id), 1);
        assert_eq!(registry.record_send_failure(id), 2);
        registry.record_send_success(id);
        assert_eq!(registry.record_send_failure(id), 1);
        assert_eq!(registry.record_send_failure(42), 0);
    }

    #[test]
    fn test_liveness_follows_writer() {
        let registry = SessionRegistry::new(5, 8);
        let (tx, rx) = channel();

        let id = registry.admit(addr(1), tx).unwrap();
        assert!(registry.is_live(id));

        drop(rx);
        assert!(!registry.is_live(id));
    }
}
