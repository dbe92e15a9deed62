//! Transport abstraction.
//!
//! The orchestrator uses exactly three operations on a connection: receive a
//! stream of raw frame text, write frames back, and learn when the peer is
//! gone. [`NodeConnection`] is that seam; [`WsServerFactory`] is the
//! injectable producer of connections, so production wires a real listener
//! (see [`crate::transport_axum::AxumWsServerFactory`]) and tests wire
//! [`InMemoryWsServerFactory`] instead — no lazy module loading or mutable
//! test proxies needed, just dependency injection of a factory supplied at
//! construction time.
//!
//! Connections are handed out as `Arc<dyn NodeConnection>` rather than
//! `Box`: the orchestrator keeps a clone alongside each registered node so
//! the health monitor can push `heartbeat.ping` frames without threading a
//! handle back out of the per-connection task that owns `recv`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

/// One bidirectional connection to a not-yet-identified peer. `recv`
/// returning `None` signals the peer is gone (socket closed, write loop
/// died, etc); callers must treat that like an unacknowledged
/// `node.deregister`. `recv` takes `&self` (not `&mut self`) so a single
/// `Arc<dyn NodeConnection>` can be read from its owning task and written
/// to from elsewhere (e.g. the health sweep) at the same time.
#[async_trait]
pub trait NodeConnection: Send + Sync {
    async fn recv(&self) -> Option<String>;

    /// Fire-and-forget: failures here are not surfaced to the caller,
    /// matching the rest of the transport's best-effort send posture.
    fn send(&self, text: String);
}

/// Produces connections for the orchestrator's accept loop. `accept`
/// returning `None` means the listener itself shut down.
#[async_trait]
pub trait WsServerFactory: Send + Sync {
    async fn accept(&self) -> Option<Arc<dyn NodeConnection>>;
}

struct InMemoryConnection {
    recv: Mutex<mpsc::UnboundedReceiver<String>>,
    send: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl NodeConnection for InMemoryConnection {
    async fn recv(&self) -> Option<String> {
        self.recv.lock().await.recv().await
    }

    fn send(&self, text: String) {
        let _ = self.send.send(text);
    }
}

/// Test-side handle for a connection established through
/// [`InMemoryWsServerFactory::connect`]: push frames in as a node would,
/// read frames the orchestrator wrote back.
pub struct TestConnectionHandle {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

impl TestConnectionHandle {
    pub fn send_frame(&self, text: impl Into<String>) {
        let _ = self.to_server.send(text.into());
    }

    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_server.recv().await
    }

    /// Simulate an unclean socket close: the node goes silent without
    /// sending `node.deregister`.
    pub fn close(self) {
        drop(self.to_server);
    }
}

/// In-process [`WsServerFactory`] for tests: [`connect`](Self::connect)
/// plays the role of a node dialing in, handing back the node-side handle
/// while the orchestrator-side half is queued for `accept`.
pub struct InMemoryWsServerFactory {
    incoming_tx: mpsc::UnboundedSender<Arc<dyn NodeConnection>>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<Arc<dyn NodeConnection>>>,
}

impl InMemoryWsServerFactory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Arc::new(Self { incoming_tx, incoming_rx: Mutex::new(incoming_rx) })
    }

    /// Simulate a node opening a connection to the gateway.
    pub fn connect(&self) -> TestConnectionHandle {
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (from_server_tx, from_server_rx) = mpsc::unbounded_channel();
        let server_side = InMemoryConnection { recv: Mutex::new(to_server_rx), send: from_server_tx };
        let _ = self.incoming_tx.send(Arc::new(server_side));
        TestConnectionHandle { to_server: to_server_tx, from_server: from_server_rx }
    }
}

#[async_trait]
impl WsServerFactory for InMemoryWsServerFactory {
    async fn accept(&self) -> Option<Arc<dyn NodeConnection>> {
        self.incoming_rx.lock().await.recv().await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_hands_orchestrator_side_to_accept() {
        let factory = InMemoryWsServerFactory::new();
        let mut client = factory.connect();
        let server_conn = factory.accept().await.unwrap();

        client.send_frame("hello");
        assert_eq!(server_conn.recv().await, Some("hello".to_string()));

        server_conn.send("world".to_string());
        assert_eq!(client.recv_frame().await, Some("world".to_string()));
    }

    #[tokio::test]
    async fn close_is_observed_as_recv_none() {
        let factory = InMemoryWsServerFactory::new();
        let client = factory.connect();
        let server_conn = factory.accept().await.unwrap();
        client.close();
        assert_eq!(server_conn.recv().await, None);
    }
}
