//! Wires the registry, session manager, router, delivery tracker and
//! checkpoint engine into the single orchestrator: transport, frame
//! dispatch, event fan-out, lifecycle.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::{SystemTime, UNIX_EPOCH},
};

use fleetgate_checkpoint::{Checkpoint, CheckpointStore, InvariantReport, check_invariants, synthesize_registry_entries};
use fleetgate_delivery::DeliveryTracker;
use fleetgate_protocol::{Frame, LaneMessage};
use fleetgate_registry::{NodeId, Registry, RegistryEntry};
use fleetgate_routing::{ChannelBindingSnapshot, ConversationBindingSnapshot, Router};
use fleetgate_sessions::{SessionManager, SessionTimeouts};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::GatewayConfig,
    events::EventBus,
    transport::{NodeConnection, WsServerFactory},
};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn lock<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The three node-lifecycle events the orchestrator publishes. Each has its
/// own [`EventBus`] rather than one bus shared across event kinds.
#[derive(Default)]
pub struct Events {
    pub on_node_registered: EventBus<NodeId>,
    pub on_node_deregistered: EventBus<NodeId>,
    pub on_node_dead: EventBus<NodeId>,
}

/// Single-process orchestrator tying together registry, sessions, router
/// and delivery tracker, fronted by an injectable transport and checkpoint
/// store.
pub struct Orchestrator {
    config: GatewayConfig,
    registry: StdMutex<Registry>,
    sessions: Arc<SessionManager>,
    router: StdMutex<Router>,
    tracker: StdMutex<DeliveryTracker>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    transport: Arc<dyn WsServerFactory>,
    pub events: Events,
    dead_rx: StdMutex<Option<mpsc::UnboundedReceiver<NodeId>>>,
    background_tasks: StdMutex<Vec<JoinHandle<()>>>,
    conn_tasks: StdMutex<Vec<JoinHandle<()>>>,
    /// Live connection handle per registered node, so the health sweep can
    /// push `heartbeat.ping` frames without the per-connection task handing
    /// its handle back out any other way.
    connections: StdMutex<HashMap<NodeId, Arc<dyn NodeConnection>>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn WsServerFactory>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Arc<Self> {
        let (sessions, dead_rx) = SessionManager::new(SessionTimeouts {
            idle_timeout: config.idle_timeout,
            suspend_timeout: config.suspend_timeout,
        });
        Arc::new(Self {
            config,
            registry: StdMutex::new(Registry::new()),
            sessions,
            router: StdMutex::new(Router::new()),
            tracker: StdMutex::new(DeliveryTracker::new()),
            checkpoint_store,
            transport,
            events: Events::default(),
            dead_rx: StdMutex::new(Some(dead_rx)),
            background_tasks: StdMutex::new(Vec::new()),
            conn_tasks: StdMutex::new(Vec::new()),
            connections: StdMutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Attempts `load()` on the checkpoint store, validates and restores it,
    /// then spawns the accept loop, health sweep and dead-session reaper.
    /// Any checkpoint problem (throw, shape violation, invariant
    /// violation, or simply none found) degrades to a clean start with a
    /// warning log — never fatal.
    pub async fn start(self: &Arc<Self>) {
        match self.checkpoint_store.load().await {
            Ok(Some(checkpoint)) => self.restore(checkpoint),
            Ok(None) => debug!("fleetgate: no checkpoint found, starting clean"),
            Err(e) => warn!(error = %e, "fleetgate: checkpoint load failed, starting clean"),
        }

        if let Some(dead_rx) = lock(&self.dead_rx).take() {
            let orchestrator = Arc::clone(self);
            self.background_tasks.lock().unwrap_or_else(|e| e.into_inner()).push(tokio::spawn(
                orchestrator.dead_session_loop(dead_rx),
            ));
        }

        let health_orchestrator = Arc::clone(self);
        self.background_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tokio::spawn(health_orchestrator.health_sweep_loop()));

        let accept_orchestrator = Arc::clone(self);
        self.background_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tokio::spawn(accept_orchestrator.accept_loop()));

        info!("fleetgate: orchestrator started");
    }

    /// Cancels background tasks and aborts in-flight connection handlers,
    /// then makes one best-effort checkpoint save. A save failure does not
    /// prevent `stop()` from completing.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let background = std::mem::take(&mut *self.background_tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in &background {
            task.abort();
        }
        for task in background {
            let _ = task.await;
        }

        let conns = std::mem::take(&mut *self.conn_tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in &conns {
            task.abort();
        }
        for task in conns {
            let _ = task.await;
        }

        self.save_checkpoint().await;
        info!("fleetgate: orchestrator stopped");
    }

    /// Captures a consistent snapshot of the three stores and persists it.
    /// Skips the save (preserving the last-good checkpoint) if the
    /// candidate fails invariant checks; a backing-store failure is logged
    /// and otherwise non-fatal.
    pub async fn save_checkpoint(&self) {
        let registry_node_ids: std::collections::HashSet<NodeId> =
            lock(&self.registry).list().map(|e| e.node_id.clone()).collect();
        let sessions = self.sessions.snapshot();
        let (channel_bindings, conversation_bindings) = lock(&self.router).snapshot();
        let pending_deliveries = lock(&self.tracker).snapshot();

        let report = check_invariants(&registry_node_ids, &sessions, &conversation_bindings, &channel_bindings, &pending_deliveries);
        if !report.valid {
            warn!(violations = ?report.violations, "fleetgate: checkpoint candidate violates invariants, skipping save");
            return;
        }

        let checkpoint = Checkpoint {
            version: fleetgate_checkpoint::CHECKPOINT_VERSION,
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            created_at_ms: now_ms(),
            sessions,
            conversation_bindings,
            channel_bindings,
            pending_deliveries,
        };

        if let Err(e) = self.checkpoint_store.save(&checkpoint).await {
            warn!(error = %e, "fleetgate: checkpoint save failed");
        }
    }

    /// Validates shape (deserialization already guarantees it), runs the
    /// cross-store invariant check, and restores all three stores.
    /// Restored state is inert: no timers, no connections, until the first
    /// real activity or an explicit rehydration.
    fn restore(&self, checkpoint: Checkpoint) {
        let registry_node_ids = checkpoint.registry_node_ids();
        let report = check_invariants(
            &registry_node_ids,
            &checkpoint.sessions,
            &checkpoint.conversation_bindings,
            &checkpoint.channel_bindings,
            &checkpoint.pending_deliveries,
        );
        if !report.valid {
            warn!(violations = ?report.violations, "fleetgate: checkpoint failed invariant check, starting clean");
            return;
        }

        let entries = synthesize_registry_entries(&checkpoint.sessions);
        lock(&self.registry).insert_all(entries);
        self.sessions.from_snapshot(checkpoint.sessions);
        lock(&self.router).from_snapshot(checkpoint.channel_bindings, checkpoint.conversation_bindings);
        lock(&self.tracker).from_snapshot(checkpoint.pending_deliveries);
        info!("fleetgate: restored checkpoint");
    }

    /// Public invariant check over the live stores (not a checkpoint
    /// candidate), for operational introspection.
    #[must_use]
    pub fn check_invariants(&self) -> InvariantReport {
        let registry_node_ids: std::collections::HashSet<NodeId> =
            lock(&self.registry).list().map(|e| e.node_id.clone()).collect();
        let sessions = self.sessions.snapshot();
        let (channel_bindings, conversation_bindings) = lock(&self.router).snapshot();
        let pending_deliveries = lock(&self.tracker).snapshot();
        check_invariants(&registry_node_ids, &sessions, &conversation_bindings, &channel_bindings, &pending_deliveries)
    }

    // ── Public surface over the private stores ───────────────────────────

    pub fn bind_channel(&self, channel_id: String, node_id: NodeId) -> crate::error::Result<()> {
        lock(&self.router).bind_channel(channel_id, node_id, &lock(&self.registry))?;
        Ok(())
    }

    #[must_use]
    pub fn drain_node(&self, node_id: &NodeId) -> Vec<LaneMessage> {
        lock(&self.router).drain_node(node_id)
    }

    #[must_use]
    pub fn registry_snapshot(&self) -> Vec<RegistryEntry> {
        lock(&self.registry).list().cloned().collect()
    }

    #[must_use]
    pub fn registry_len(&self) -> usize {
        lock(&self.registry).len()
    }

    #[must_use]
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub fn channel_binding(&self, channel_id: &str) -> Option<NodeId> {
        lock(&self.router).get_binding(channel_id)
    }

    #[must_use]
    pub fn pending_count(&self, node_id: &NodeId) -> usize {
        lock(&self.tracker).pending_count(node_id)
    }

    /// `getRouter`: read-only view of the channel-binding half of the
    /// router (`channelId → nodeId`). Callers mutate the router only
    /// through [`Orchestrator::bind_channel`]/[`Orchestrator::drain_node`],
    /// never this snapshot.
    #[must_use]
    pub fn router(&self) -> Vec<ChannelBindingSnapshot> {
        lock(&self.router).snapshot().0
    }

    /// `getConversationStore`: read-only view of the conversation-binding
    /// half of the router (`conversationKey → nodeId`), populated by
    /// `routeWithScope` on each scoped `lane.message`.
    #[must_use]
    pub fn conversation_store(&self) -> Vec<ConversationBindingSnapshot> {
        lock(&self.router).snapshot().1
    }

    /// `getDeliveryTracker`: read-only view of every node's outstanding,
    /// not-yet-acked deliveries.
    #[must_use]
    pub fn delivery_tracker(&self) -> HashMap<NodeId, Vec<LaneMessage>> {
        lock(&self.tracker).snapshot()
    }

    // ── Background tasks ──────────────────────────────────────────────────

    async fn dead_session_loop(self: Arc<Self>, mut dead_rx: mpsc::UnboundedReceiver<NodeId>) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                maybe_id = dead_rx.recv() => {
                    match maybe_id {
                        Some(node_id) => {
                            debug!(node_id = %node_id, "fleetgate: session reached disconnected, reaping");
                            self.events.on_node_dead.fire(node_id.clone());
                            self.cascade_remove(&node_id);
                        },
                        None => break,
                    }
                },
            }
        }
    }

    async fn health_sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.health_check_interval);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = interval.tick() => self.run_health_sweep(),
            }
        }
    }

    /// Two-phase liveness sweep: entries already marked not alive are
    /// confirmed dead and reaped; everyone else is marked not alive and
    /// pinged, giving them until the next sweep to pong back.
    fn run_health_sweep(&self) {
        let (confirmed_dead, to_ping) = {
            let mut registry = lock(&self.registry);
            let ids: Vec<NodeId> = registry.list().map(|e| e.node_id.clone()).collect();
            let mut dead = Vec::new();
            let mut ping = Vec::new();
            for node_id in ids {
                let Some(entry) = registry.get(&node_id) else { continue };
                if entry.is_alive {
                    registry.mark_alive(&node_id, false);
                    ping.push(node_id);
                } else {
                    dead.push(node_id);
                }
            }
            (dead, ping)
        };

        for node_id in confirmed_dead {
            debug!(node_id = %node_id, "fleetgate: node missed two sweeps, reaping");
            self.events.on_node_dead.fire(node_id.clone());
            self.cascade_remove(&node_id);
        }

        for node_id in to_ping {
            self.send_ping(&node_id);
        }
    }

    /// Best-effort: a send failure does not itself declare the node dead,
    /// the next sweep does that if no pong arrives.
    fn send_ping(&self, node_id: &NodeId) {
        if let Some(conn) = lock(&self.connections).get(node_id) {
            conn.send(Frame::HeartbeatPing { timestamp: now_ms() }.encode());
        }
    }

    async fn accept_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                maybe_conn = self.transport.accept() => {
                    match maybe_conn {
                        Some(conn) => {
                            let orchestrator = Arc::clone(&self);
                            let handle = tokio::spawn(orchestrator.handle_connection(conn));
                            self.conn_tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
                        },
                        None => break,
                    }
                },
            }
        }
    }

    // ── Per-connection frame dispatch ─────────────────────────────────────

    async fn handle_connection(self: Arc<Self>, conn: Arc<dyn NodeConnection>) {
        let mut registered: Option<NodeId> = None;
        let mut warned = false;

        while let Some(text) = conn.recv().await {
            let frame = match Frame::decode(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    if !warned {
                        warn!(error = %e, "fleetgate: dropping malformed frame on this connection");
                        warned = true;
                    }
                    continue;
                },
            };

            match frame {
                Frame::NodeRegister { node_id, capabilities, token } => {
                    match self.handle_register(node_id, capabilities, &token) {
                        Ok(node_id) => {
                            conn.send(Frame::NodeRegisterAck { node_id: node_id.as_str().to_string() }.encode());
                            lock(&self.connections).insert(node_id.clone(), Arc::clone(&conn));
                            registered = Some(node_id);
                        },
                        Err(e) => warn!(error = %e, "fleetgate: node.register rejected"),
                    }
                },
                Frame::NodeDeregister { node_id, reason } => {
                    let Ok(node_id) = NodeId::new(node_id) else { continue };
                    self.handle_deregister(&node_id, reason.as_deref());
                    if registered.as_ref() == Some(&node_id) {
                        registered = None;
                    }
                },
                Frame::HeartbeatPong { .. } => {
                    if let Some(node_id) = &registered {
                        lock(&self.registry).mark_alive(node_id, true);
                        self.sessions.touch(node_id);
                    }
                },
                Frame::LaneMessageFrame { message, .. } => {
                    if let Some(node_id) = &registered {
                        self.sessions.touch(node_id);
                        self.handle_lane_message(message.clone());
                        conn.send(Frame::LaneMessageAck { message_id: message.id }.encode());
                    }
                },
                Frame::NodeRegisterAck { .. } | Frame::HeartbeatPing { .. } | Frame::LaneMessageAck { .. } => {
                    debug!("fleetgate: dropping frame not valid inbound from a node");
                },
            }
        }

        // Socket closed without an explicit node.deregister: treat it the
        // same way.
        if let Some(node_id) = registered {
            self.handle_deregister(&node_id, Some("connection closed"));
        }
    }

    fn handle_register(&self, node_id: String, capabilities: fleetgate_protocol::Capabilities, token: &str) -> crate::error::Result<NodeId> {
        let node_id = NodeId::new(node_id)?;
        if let Some(expected) = &self.config.register_token
            && expected != token
        {
            return Err(crate::error::Error::InvalidToken(node_id));
        }
        lock(&self.registry).insert(RegistryEntry::new(node_id.clone(), capabilities))?;
        self.sessions.create(node_id.clone());
        self.events.on_node_registered.fire(node_id.clone());
        Ok(node_id)
    }

    fn handle_deregister(&self, node_id: &NodeId, reason: Option<&str>) {
        debug!(node_id = %node_id, reason = reason.unwrap_or("none"), "fleetgate: deregistering node");
        self.cascade_remove(node_id);
        self.events.on_node_deregistered.fire(node_id.clone());
    }

    /// Drains the delivery tracker, removes router bindings, tears down the
    /// session and removes the registry entry — the cascade every removal
    /// path (explicit deregister, socket close, health reap, session
    /// timeout) shares.
    fn cascade_remove(&self, node_id: &NodeId) {
        lock(&self.tracker).drain_for_node(node_id);
        lock(&self.router).remove_for_node(node_id);
        self.sessions.remove(node_id);
        lock(&self.registry).remove(node_id);
        lock(&self.connections).remove(node_id);
    }

    fn handle_lane_message(&self, message: LaneMessage) {
        let target = if message.routing_context.is_some() {
            lock(&self.router).route_with_scope(&message, &self.config.bot_id)
        } else {
            lock(&self.router).get_binding(&message.channel_id)
        };
        let Some(target) = target else {
            debug!(channel_id = %message.channel_id, "fleetgate: lane message has no resolvable target, dropping");
            return;
        };
        lock(&self.router).enqueue(target.clone(), message.clone());
        lock(&self.tracker).track(target, message);
    }
}
