//! Per-node session state machine with timer-driven transitions.
//!
//! ```text
//!   connected ──(idle timer)──▶ idle ──(suspend timer)──▶ suspended
//!      ▲                                                     │
//!      └──────────────────(activity)────────────────────────┤
//!                                                  (suspend timer again)
//!                                                             ▼
//!                                                       disconnected
//! ```
//!
//! Timers are re-expressed as lightweight cancellable tasks rather than
//! host timer handles: every [`SessionManager::create`] and
//! [`SessionManager::touch`] stamps the session with a fresh, globally
//! unique generation number and spawns a `tokio::time::sleep`-based task
//! carrying that generation. When the task wakes it only acts if the
//! session's generation is still the one it was spawned with — any
//! intervening activity (which bumps the generation) makes stale timers
//! silent no-ops instead of requiring explicit `JoinHandle` cancellation.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub use fleetgate_registry::NodeId;

/// The four states a session may be in. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connected,
    Idle,
    Suspended,
    Disconnected,
}

/// Live per-node session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub node_id: NodeId,
    pub state: SessionState,
    pub connected_at: Instant,
    pub last_activity_at: Instant,
}

/// Timerless, serializable capture of a [`Session`] for checkpointing.
/// `Instant` has no stable epoch, so snapshots carry
/// milliseconds-since-`UNIX_EPOCH` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub node_id: NodeId,
    pub state: SessionState,
    pub connected_at_ms: u64,
    pub last_activity_at_ms: u64,
}

struct Entry {
    session: Session,
    generation: u64,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Configuration for the two single-shot timers driving the state machine.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    pub idle_timeout: Duration,
    pub suspend_timeout: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5 * 60),
            suspend_timeout: Duration::from_secs(2 * 60),
        }
    }
}

/// Per-node session state machine manager.
pub struct SessionManager {
    timeouts: SessionTimeouts,
    sessions: Mutex<HashMap<NodeId, Entry>>,
    next_generation: AtomicU64,
    dead_tx: mpsc::UnboundedSender<NodeId>,
}

impl SessionManager {
    /// Returns the manager plus a receiver that yields a `NodeId` every time
    /// a session completes `suspended → disconnected`. The caller (the
    /// orchestrator) drains this to fire `onNodeDead` and cascade removal.
    #[must_use]
    pub fn new(timeouts: SessionTimeouts) -> (Arc<Self>, mpsc::UnboundedReceiver<NodeId>) {
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            timeouts,
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            dead_tx,
        });
        (manager, dead_rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, Entry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_gen(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a session in state `connected` and arm its idle timer.
    pub fn create(self: &Arc<Self>, node_id: NodeId) -> Session {
        let now = Instant::now();
        let generation = self.next_gen();
        let session = Session {
            node_id: node_id.clone(),
            state: SessionState::Connected,
            connected_at: now,
            last_activity_at: now,
        };
        self.lock().insert(node_id.clone(), Entry {
            session: session.clone(),
            generation,
        });
        self.spawn_idle_timer(node_id, generation);
        session
    }

    /// Record activity: resets the idle timer and clears any running
    /// suspend timer. Transitions back to `connected` from `idle`/`suspended`.
    /// No-op if the node has no session or its session is already terminal.
    pub fn touch(self: &Arc<Self>, node_id: &NodeId) {
        let generation = {
            let mut sessions = self.lock();
            let Some(entry) = sessions.get_mut(node_id) else {
                return;
            };
            if entry.session.state == SessionState::Disconnected {
                return;
            }
            entry.session.state = SessionState::Connected;
            entry.session.last_activity_at = Instant::now();
            let generation = self.next_gen();
            entry.generation = generation;
            generation
        };
        self.spawn_idle_timer(node_id.clone(), generation);
    }

    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<Session> {
        self.lock().get(node_id).map(|e| e.session.clone())
    }

    /// Cancels timers (by invalidating the generation) and deletes the
    /// session.
    pub fn remove(&self, node_id: &NodeId) -> Option<Session> {
        self.lock().remove(node_id).map(|e| e.session)
    }

    /// Timerless capture for checkpointing.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.lock()
            .values()
            .map(|e| SessionSnapshot {
                node_id: e.session.node_id.clone(),
                state: e.session.state,
                connected_at_ms: now_ms(),
                last_activity_at_ms: now_ms(),
            })
            .collect()
    }

    /// Restore sessions WITHOUT starting timers. Restored sessions are
    /// inert until the first real activity: starting timers here would mark
    /// every restored session dead on the very next sweep regardless of
    /// true liveness.
    pub fn from_snapshot(&self, snapshots: Vec<SessionSnapshot>) {
        let mut sessions = self.lock();
        sessions.clear();
        let now = Instant::now();
        for snap in snapshots {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            sessions.insert(snap.node_id.clone(), Entry {
                session: Session {
                    node_id: snap.node_id,
                    state: snap.state,
                    connected_at: now,
                    last_activity_at: now,
                },
                generation,
            });
        }
    }

    fn spawn_idle_timer(self: &Arc<Self>, node_id: NodeId, generation: u64) {
        let manager = Arc::clone(self);
        let timeout = self.timeouts.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.on_idle_elapsed(node_id, generation);
        });
    }

    fn spawn_suspend_timer(self: &Arc<Self>, node_id: NodeId, generation: u64) {
        let manager = Arc::clone(self);
        let timeout = self.timeouts.suspend_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.on_suspend_elapsed(node_id, generation);
        });
    }

    fn on_idle_elapsed(self: &Arc<Self>, node_id: NodeId, generation: u64) {
        let transitioned = {
            let mut sessions = self.lock();
            match sessions.get_mut(&node_id) {
                Some(entry) if entry.generation == generation && entry.session.state == SessionState::Connected => {
                    entry.session.state = SessionState::Idle;
                    true
                },
                _ => false,
            }
        };
        if transitioned {
            debug!(node_id = %node_id, "session idle");
            self.spawn_suspend_timer(node_id, generation);
        }
    }

    fn on_suspend_elapsed(self: &Arc<Self>, node_id: NodeId, generation: u64) {
        let next = {
            let mut sessions = self.lock();
            match sessions.get_mut(&node_id) {
                Some(entry) if entry.generation == generation && entry.session.state == SessionState::Idle => {
                    entry.session.state = SessionState::Suspended;
                    Some(false)
                },
                Some(entry) if entry.generation == generation && entry.session.state == SessionState::Suspended => {
                    entry.session.state = SessionState::Disconnected;
                    Some(true)
                },
                _ => None,
            }
        };
        match next {
            Some(false) => {
                debug!(node_id = %node_id, "session suspended");
                self.spawn_suspend_timer(node_id, generation);
            },
            Some(true) => {
                debug!(node_id = %node_id, "session disconnected (terminal)");
                let _ = self.dead_tx.send(node_id);
            },
            None => {},
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn manager(idle_ms: u64, suspend_ms: u64) -> (Arc<SessionManager>, mpsc::UnboundedReceiver<NodeId>) {
        SessionManager::new(SessionTimeouts {
            idle_timeout: Duration::from_millis(idle_ms),
            suspend_timeout: Duration::from_millis(suspend_ms),
        })
    }

    #[tokio::test]
    async fn create_starts_connected() {
        let (mgr, _dead) = manager(50, 50);
        let session = mgr.create(id("agent-1"));
        assert_eq!(session.state, SessionState::Connected);
    }

    #[tokio::test]
    async fn idle_then_suspended_then_dead() {
        let (mgr, mut dead) = manager(20, 20);
        mgr.create(id("agent-1"));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Idle);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Suspended);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Disconnected);
        let dead_id = dead.recv().await.unwrap();
        assert_eq!(dead_id, id("agent-1"));
    }

    #[tokio::test]
    async fn touch_resets_from_idle_to_connected() {
        let (mgr, _dead) = manager(20, 20);
        mgr.create(id("agent-1"));
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Idle);

        mgr.touch(&id("agent-1"));
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Connected);

        // Stale suspend timer from the idle period must not fire now.
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn touch_keeps_alive_indefinitely() {
        let (mgr, _dead) = manager(15, 15);
        mgr.create(id("agent-1"));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            mgr.touch(&id("agent-1"));
        }
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Connected);
    }

    #[tokio::test]
    async fn remove_cancels_future_transitions() {
        let (mgr, _dead) = manager(15, 15);
        mgr.create(id("agent-1"));
        mgr.remove(&id("agent-1"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(mgr.get(&id("agent-1")).is_none());
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_state_value() {
        let (mgr, _dead) = manager(5_000, 5_000);
        mgr.create(id("agent-1"));
        mgr.create(id("agent-2"));
        mgr.touch(&id("agent-2"));

        let snap = mgr.snapshot();
        assert_eq!(snap.len(), 2);

        let (mgr2, _dead2) = manager(5_000, 5_000);
        mgr2.from_snapshot(snap);
        assert_eq!(mgr2.get(&id("agent-1")).unwrap().state, SessionState::Connected);
        assert_eq!(mgr2.get(&id("agent-2")).unwrap().state, SessionState::Connected);
    }

    #[tokio::test]
    async fn from_snapshot_does_not_arm_timers() {
        let (mgr, _dead) = manager(15, 15);
        mgr.from_snapshot(vec![SessionSnapshot {
            node_id: id("agent-1"),
            state: SessionState::Connected,
            connected_at_ms: 0,
            last_activity_at_ms: 0,
        }]);
        tokio::time::sleep(Duration::from_millis(60)).await;
        // No idle timer was armed by from_snapshot, so state is unchanged.
        assert_eq!(mgr.get(&id("agent-1")).unwrap().state, SessionState::Connected);
    }

    #[tokio::test]
    async fn touch_on_unknown_node_is_noop() {
        let (mgr, _dead) = manager(20, 20);
        mgr.touch(&id("ghost"));
        assert!(mgr.get(&id("ghost")).is_none());
    }
}
