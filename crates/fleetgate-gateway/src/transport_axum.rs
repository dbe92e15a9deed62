//! Production `WsServerFactory`: a single `/ws` route on an Axum router,
//! with each accepted socket split into a read loop and a write loop and
//! handed to the orchestrator's generic `NodeConnection` seam instead of
//! being driven inline by the handler.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::transport::{NodeConnection, WsServerFactory};

struct AxumConnection {
    recv: Mutex<mpsc::UnboundedReceiver<String>>,
    send: mpsc::UnboundedSender<String>,
}

#[async_trait::async_trait]
impl NodeConnection for AxumConnection {
    async fn recv(&self) -> Option<String> {
        self.recv.lock().await.recv().await
    }

    fn send(&self, text: String) {
        let _ = self.send.send(text);
    }
}

/// Binds a TCP listener and serves `/ws`, handing each accepted socket to
/// the orchestrator's accept loop via an internal queue. `accept()` pulls
/// from that queue rather than from the socket directly, so the same
/// `WsServerFactory` seam covers both this and [`crate::transport::InMemoryWsServerFactory`].
pub struct AxumWsServerFactory {
    bind_addr: SocketAddr,
    incoming_tx: mpsc::UnboundedSender<Arc<dyn NodeConnection>>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<Arc<dyn NodeConnection>>>,
}

impl AxumWsServerFactory {
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Arc::new(Self { bind_addr, incoming_tx, incoming_rx: Mutex::new(incoming_rx) })
    }

    /// Binds `bind_addr` and serves until the process is torn down.
    /// Intended to be spawned as its own task by `Orchestrator::start`.
    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .with_state(Arc::clone(&self));
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "fleetgate: listening for node connections");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
    }
}

#[async_trait::async_trait]
impl WsServerFactory for AxumWsServerFactory {
    async fn accept(&self) -> Option<Arc<dyn NodeConnection>> {
        self.incoming_rx.lock().await.recv().await
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(factory): State<Arc<AxumWsServerFactory>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, remote_addr, factory))
}

async fn handle_socket(socket: WebSocket, remote_addr: SocketAddr, factory: Arc<AxumWsServerFactory>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(remote = %remote_addr, "fleetgate: write loop closed");
                break;
            }
        }
    });

    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t.to_string(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(remote = %remote_addr, error = %e, "fleetgate: read error");
                    break;
                },
            };
            if in_tx.send(text).is_err() {
                break;
            }
        }
        // Dropping in_tx here is how the orchestrator's `recv` loop learns
        // this socket is gone without an explicit `node.deregister`.
    });

    let conn: Arc<dyn NodeConnection> = Arc::new(AxumConnection { recv: Mutex::new(in_rx), send: out_tx });
    let _ = factory.incoming_tx.send(conn);
}
