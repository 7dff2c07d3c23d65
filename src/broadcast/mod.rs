//! Real-time broadcast server.
//!
//! Connection-oriented fan-out of pipeline results to authorized
//! subscribers:
//! - connection registry with authentication and cached permission grants
//! - typed, namespaced topics (`kind:identifier`) with a per-kind
//!   authorization predicate
//! - payload-level secondary authorization (vehicle-region access)
//! - heartbeat/liveness sweep closing idle connections
//!
//! The server core is transport-independent: each connection is a sender
//! handle, and the bundled TCP listener speaks newline-delimited JSON over
//! persistent connections.

pub mod connection;
pub mod message;
pub mod server;
pub mod topic;

pub use connection::{ClientConnection, ConnectionId};
pub use message::{ClientMessage, ClientMessageKind, ServerMessage, ServerMessageKind};
pub use server::{RealtimeBroadcastServer, ServerStats};
pub use topic::Topic;
