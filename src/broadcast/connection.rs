//! Connection registry entries.
//!
//! A `ClientConnection` is the server-side handle for one persistent client
//! connection: its sender half, cached auth grant, local subscription set and
//! liveness clock. The transport task owns the receiving half; delivery goes
//! through the unbounded channel so a slow socket never blocks fan-out.

use crate::broadcast::message::ServerMessage;
use crate::broadcast::topic::Topic;
use crate::collaborators::AuthGrant;
use crate::error::SentinelError;
use crate::types::now_ms;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub type ConnectionId = String;

pub struct ClientConnection {
    pub connection_id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerMessage>,
    /// Cached for the connection's lifetime once auth succeeds
    grant: RwLock<Option<AuthGrant>>,
    subscriptions: RwLock<BTreeSet<Topic>>,
    last_activity_ms: AtomicU64,
    closed_tx: watch::Sender<bool>,
}

impl ClientConnection {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            connection_id: Uuid::new_v4().to_string(),
            sender,
            grant: RwLock::new(None),
            subscriptions: RwLock::new(BTreeSet::new()),
            last_activity_ms: AtomicU64::new(now_ms()),
            closed_tx,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.grant.read().is_some()
    }

    pub fn grant(&self) -> Option<AuthGrant> {
        self.grant.read().clone()
    }

    /// Cache the grant. Re-auth is a new connection; a second grant is
    /// ignored.
    pub fn set_grant(&self, grant: AuthGrant) {
        let mut slot = self.grant.write();
        if slot.is_none() {
            *slot = Some(grant);
        }
    }

    pub fn add_subscription(&self, topic: Topic) {
        self.subscriptions.write().insert(topic);
    }

    pub fn remove_subscription(&self, topic: &Topic) {
        self.subscriptions.write().remove(topic);
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscriptions.read().contains(topic)
    }

    pub fn subscriptions(&self) -> Vec<Topic> {
        self.subscriptions.read().iter().cloned().collect()
    }

    /// Refresh the liveness clock.
    pub fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Milliseconds since the last client activity.
    pub fn idle_ms(&self) -> u64 {
        now_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Queue a message for delivery. Fails when the transport task is gone
    /// or the connection was closed.
    pub fn send(&self, message: ServerMessage) -> Result<(), SentinelError> {
        if self.is_closed() {
            return Err(SentinelError::Delivery {
                connection_id: self.connection_id.clone(),
                message: "connection closed".to_string(),
            });
        }
        self.sender
            .send(message)
            .map_err(|e| SentinelError::Delivery {
                connection_id: self.connection_id.clone(),
                message: e.to_string(),
            })
    }

    /// Signal the transport task to tear the connection down. `send_replace`
    /// records the flag even while no receiver is subscribed, so a close
    /// issued between transport polls is never lost.
    pub fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Resolves once `close` has been called.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // wait_for also checks the current value, so a close that raced the
        // subscribe is not missed
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
