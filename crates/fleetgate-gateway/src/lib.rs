//! Orchestrator crate: wires [`fleetgate_registry`], [`fleetgate_sessions`],
//! [`fleetgate_routing`], [`fleetgate_delivery`] and [`fleetgate_checkpoint`]
//! behind a single injectable transport into one composed gateway state.

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod transport;
pub mod transport_axum;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use orchestrator::{Events, Orchestrator};
pub use transport::{InMemoryWsServerFactory, NodeConnection, TestConnectionHandle, WsServerFactory};
pub use transport_axum::AxumWsServerFactory;
