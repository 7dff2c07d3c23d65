//! Connection registry, authentication, subscription authorization, fan-out
//! and liveness management.
//!
//! The registry and topic index are shared across connection handlers and
//! the sweep timer; every mutation is atomic with respect to broadcast
//! iteration (snapshot-then-iterate, no lock held across a send). Nothing
//! here blocks on a collaborator while holding registry locks.

use crate::audit::{AuditEvent, AuditLog};
use crate::broadcast::connection::{ClientConnection, ConnectionId};
use crate::broadcast::message::{
    AuthPayload, ClientMessage, ClientMessageKind, RequestPayload, RequestType, ServerMessage,
    ServerMessageKind, SubscribePayload,
};
use crate::broadcast::topic::Topic;
use crate::collaborators::{AuthProvider, VehicleDirectory};
use crate::config::ServerConfig;
use crate::error::{Result, SentinelError};
use crate::health::IntegrationHealthTracker;
use crate::types::{DiagnosticEvent, TelemetrySample, TrafficViolation};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

/// Server-level statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerStats {
    pub connections: usize,
    pub authenticated: usize,
    pub topics: usize,
    pub messages_broadcast: u64,
    pub delivery_failures: u64,
}

/// Real-time broadcast server.
pub struct RealtimeBroadcastServer {
    config: ServerConfig,
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn VehicleDirectory>,
    health: Arc<IntegrationHealthTracker>,
    audit: Arc<AuditLog>,
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// topic → subscriber ids; weak back-reference, the registry owns
    topic_index: RwLock<HashMap<Topic, BTreeSet<ConnectionId>>>,
    /// Last sample per vehicle, serving `latest_telemetry` requests
    latest_telemetry: RwLock<HashMap<String, TelemetrySample>>,
    /// Populated once the accept loop has bound its listener
    local_addr: RwLock<Option<std::net::SocketAddr>>,
    messages_broadcast: AtomicU64,
    delivery_failures: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl RealtimeBroadcastServer {
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn VehicleDirectory>,
        health: Arc<IntegrationHealthTracker>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            auth,
            directory,
            health,
            audit,
            connections: RwLock::new(HashMap::new()),
            topic_index: RwLock::new(HashMap::new()),
            latest_telemetry: RwLock::new(HashMap::new()),
            local_addr: RwLock::new(None),
            messages_broadcast: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            shutdown_tx,
        }
    }

    // ============================================================================================
    // CONNECTION LIFECYCLE
    // ============================================================================================

    /// Register a new connection around its delivery channel.
    pub fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Arc<ClientConnection> {
        let conn = Arc::new(ClientConnection::new(sender));
        self.connections
            .write()
            .insert(conn.connection_id.clone(), Arc::clone(&conn));
        debug!("CONNECTION_OPENED connection={}", conn.connection_id);
        conn
    }

    /// Drop a connection from the registry and topic index and signal its
    /// transport task.
    pub fn unregister(&self, connection_id: &str) {
        let removed = self.connections.write().remove(connection_id);
        {
            let mut index = self.topic_index.write();
            for subscribers in index.values_mut() {
                subscribers.remove(connection_id);
            }
            index.retain(|_, subscribers| !subscribers.is_empty());
        }
        if let Some(conn) = removed {
            conn.close();
            debug!("CONNECTION_CLOSED connection={}", connection_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Address the accept loop is listening on, once bound. Lets callers
    /// configure port 0 and discover the assigned port.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.read()
    }

    // ============================================================================================
    // MESSAGE HANDLING
    // ============================================================================================

    /// Handle one decoded client frame.
    ///
    /// `Err(Authentication)` tells the transport to close the connection;
    /// every other failure is answered with an error frame and the
    /// connection stays open.
    pub fn handle_message(&self, conn: &Arc<ClientConnection>, msg: ClientMessage) -> Result<()> {
        conn.touch();

        // Before auth the only acceptable frame is `auth`
        if !conn.is_authenticated() && msg.kind != ClientMessageKind::Auth {
            let _ = conn.send(ServerMessage::error("authentication required"));
            return Ok(());
        }

        match msg.kind {
            ClientMessageKind::Auth => self.handle_auth(conn, msg),
            ClientMessageKind::Subscribe => {
                self.handle_subscription(conn, msg, true);
                Ok(())
            }
            ClientMessageKind::Unsubscribe => {
                self.handle_subscription(conn, msg, false);
                Ok(())
            }
            ClientMessageKind::Request => {
                self.handle_request(conn, msg);
                Ok(())
            }
            ClientMessageKind::Ping => {
                let _ = conn.send(ServerMessage::pong());
                Ok(())
            }
        }
    }

    fn handle_auth(&self, conn: &Arc<ClientConnection>, msg: ClientMessage) -> Result<()> {
        let payload: AuthPayload = match serde_json::from_value(msg.payload) {
            Ok(p) => p,
            Err(e) => {
                let _ = conn.send(ServerMessage::error(format!("malformed auth payload: {}", e)));
                return Ok(());
            }
        };

        match self.auth.validate_token(&payload.token, &payload.user_id) {
            Ok(grant) => {
                let permissions: Vec<&String> = grant.permissions.iter().collect();
                let reply = ServerMessage::response(
                    json!({ "authenticated": true, "permissions": permissions }),
                    msg.message_id.as_deref(),
                );
                conn.set_grant(grant);
                let _ = conn.send(reply);

                self.audit.record(AuditEvent::Authentication {
                    connection_id: conn.connection_id.clone(),
                    user_id: payload.user_id.clone(),
                    success: true,
                    reason: None,
                });
                info!(
                    "AUTH_OK connection={} user={}",
                    conn.connection_id, payload.user_id
                );
                Ok(())
            }
            Err(e) => {
                self.audit.record(AuditEvent::Authentication {
                    connection_id: conn.connection_id.clone(),
                    user_id: payload.user_id.clone(),
                    success: false,
                    reason: Some(e.to_string()),
                });
                warn!(
                    "AUTH_FAILED connection={} user={} reason={}",
                    conn.connection_id, payload.user_id, e
                );
                let _ = conn.send(ServerMessage::error(e.to_string()));
                Err(SentinelError::Authentication(e.to_string()))
            }
        }
    }

    /// Subscribe/unsubscribe. All requested topics are validated and
    /// authorized before any is applied: no partial subscription.
    fn handle_subscription(&self, conn: &Arc<ClientConnection>, msg: ClientMessage, add: bool) {
        let grant = match conn.grant() {
            Some(g) => g,
            None => return,
        };
        let payload: SubscribePayload = match serde_json::from_value(msg.payload) {
            Ok(p) => p,
            Err(e) => {
                let _ = conn.send(ServerMessage::error(format!(
                    "malformed subscribe payload: {}",
                    e
                )));
                return;
            }
        };

        let mut topics = Vec::new();
        let mut raw_topics: Vec<String> = payload.topics.unwrap_or_default();
        for vehicle_id in payload.vehicle_ids.unwrap_or_default() {
            raw_topics.push(format!("vehicle:{}", vehicle_id));
        }
        for data_type in payload.data_types.unwrap_or_default() {
            raw_topics.push(format!("type:{}", data_type));
        }

        if raw_topics.is_empty() {
            let _ = conn.send(ServerMessage::error("no topics in subscribe payload"));
            return;
        }

        for raw in &raw_topics {
            let topic = match Topic::parse(raw) {
                Ok(t) => t,
                Err(e) => {
                    let _ = conn.send(ServerMessage::error(e.to_string()));
                    return;
                }
            };
            if add {
                if let Err(e) = topic.authorize(&grant) {
                    self.audit.record(AuditEvent::Subscription {
                        connection_id: conn.connection_id.clone(),
                        user_id: grant.user_id.clone(),
                        topic: topic.to_string(),
                        accepted: false,
                        reason: Some(e.to_string()),
                    });
                    let _ = conn.send(ServerMessage::error(e.to_string()));
                    return;
                }
            }
            topics.push(topic);
        }

        // Everything checked out, apply the whole batch
        {
            let mut index = self.topic_index.write();
            for topic in &topics {
                if add {
                    index
                        .entry(topic.clone())
                        .or_default()
                        .insert(conn.connection_id.clone());
                    conn.add_subscription(topic.clone());
                } else {
                    if let Some(subscribers) = index.get_mut(topic) {
                        subscribers.remove(&conn.connection_id);
                        if subscribers.is_empty() {
                            index.remove(topic);
                        }
                    }
                    conn.remove_subscription(topic);
                }
            }
        }

        if add {
            for topic in &topics {
                self.audit.record(AuditEvent::Subscription {
                    connection_id: conn.connection_id.clone(),
                    user_id: grant.user_id.clone(),
                    topic: topic.to_string(),
                    accepted: true,
                    reason: None,
                });
            }
        }

        let names: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
        let _ = conn.send(ServerMessage::response(
            json!({
                "action": if add { "subscribed" } else { "unsubscribed" },
                "topics": names,
            }),
            msg.message_id.as_deref(),
        ));
    }

    fn handle_request(&self, conn: &Arc<ClientConnection>, msg: ClientMessage) {
        let grant = match conn.grant() {
            Some(g) => g,
            None => return,
        };
        let payload: RequestPayload = match serde_json::from_value(msg.payload) {
            Ok(p) => p,
            Err(e) => {
                let _ = conn.send(ServerMessage::error(format!(
                    "malformed request payload: {}",
                    e
                )));
                return;
            }
        };

        // Vehicle-scoped requests obey the same region rule as delivery
        if let Some(record) = self.directory.lookup(&payload.vehicle_id) {
            if !grant.region_scope.allows(&record.home_region) {
                let _ = conn.send(ServerMessage::error(format!(
                    "vehicle {} outside allowed regions",
                    payload.vehicle_id
                )));
                return;
            }
        }

        let reply = match payload.request_type {
            RequestType::LatestTelemetry => {
                let latest = self
                    .latest_telemetry
                    .read()
                    .get(&payload.vehicle_id)
                    .cloned();
                match latest {
                    Some(sample) => ServerMessage::response(
                        json!({ "telemetry": sample }),
                        msg.message_id.as_deref(),
                    ),
                    None => ServerMessage::error(format!(
                        "no telemetry for vehicle {}",
                        payload.vehicle_id
                    )),
                }
            }
            RequestType::DeviceStatus => match self.health.status_for(&payload.vehicle_id) {
                Some(status) => ServerMessage::response(
                    json!({ "status": status }),
                    msg.message_id.as_deref(),
                ),
                None => ServerMessage::error(format!(
                    "no integration record for vehicle {}",
                    payload.vehicle_id
                )),
            },
            // Historical queries belong to the persistence collaborator
            RequestType::HistoricalData => {
                ServerMessage::error("historical_data is not served by this endpoint")
            }
        };

        let _ = conn.send(reply);
    }

    // ============================================================================================
    // FAN-OUT
    // ============================================================================================

    /// Broadcast a telemetry sample to every matching topic.
    pub fn broadcast_sample(&self, sample: &TelemetrySample) {
        self.latest_telemetry
            .write()
            .insert(sample.vehicle_id.clone(), sample.clone());

        let topics = self.topics_for_vehicle(&sample.vehicle_id, "telemetry");
        let message = ServerMessage::new(
            ServerMessageKind::Telemetry,
            Some(sample.vehicle_id.clone()),
            json!({ "sample": sample }),
        );
        self.publish(&topics, message);
    }

    /// Broadcast a diagnostic event.
    pub fn broadcast_diagnostic(&self, event: &DiagnosticEvent) {
        let topics = self.topics_for_vehicle(&event.vehicle_id, "diagnostic");
        let message = ServerMessage::new(
            ServerMessageKind::Diagnostic,
            Some(event.vehicle_id.clone()),
            json!({ "event": event }),
        );
        self.publish(&topics, message);
    }

    /// Broadcast a detected violation as an alert.
    pub fn broadcast_violation(&self, violation: &TrafficViolation) {
        let topics = self.topics_for_vehicle(&violation.vehicle_id, "alert");
        let message = ServerMessage::new(
            ServerMessageKind::Alert,
            Some(violation.vehicle_id.clone()),
            json!({ "violation": violation }),
        );
        self.publish(&topics, message);
    }

    /// Topics a vehicle-scoped payload lands on.
    fn topics_for_vehicle(&self, vehicle_id: &str, data_type: &str) -> Vec<Topic> {
        let mut topics = vec![
            Topic::Vehicle(vehicle_id.to_string()),
            Topic::DataType(data_type.to_string()),
        ];
        if let Some(record) = self.directory.lookup(vehicle_id) {
            topics.push(Topic::Region(record.home_region));
            if let Some(operator_id) = record.operator_id {
                topics.push(Topic::Operator(operator_id));
            }
        }
        topics
    }

    /// Deliver `message` to every connection subscribed to any of `topics`
    /// and passing the payload-level region check. A failed delivery drops
    /// that connection; the rest still receive the message.
    pub fn publish(&self, topics: &[Topic], message: ServerMessage) {
        // Snapshot subscriber ids, then resolve handles, then send without
        // any registry lock held
        let recipient_ids: BTreeSet<ConnectionId> = {
            let index = self.topic_index.read();
            topics
                .iter()
                .filter_map(|t| index.get(t))
                .flatten()
                .cloned()
                .collect()
        };
        if recipient_ids.is_empty() {
            return;
        }

        let payload_region = message
            .vehicle_id
            .as_deref()
            .and_then(|v| self.directory.lookup(v))
            .map(|record| record.home_region);

        let recipients: Vec<Arc<ClientConnection>> = {
            let connections = self.connections.read();
            recipient_ids
                .iter()
                .filter_map(|id| connections.get(id).map(Arc::clone))
                .collect()
        };

        let mut failed: Vec<ConnectionId> = Vec::new();
        for conn in recipients {
            let allowed = match (&payload_region, conn.grant()) {
                (Some(region), Some(grant)) => grant.region_scope.allows(region),
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if !allowed {
                continue;
            }
            if let Err(e) = conn.send(message.clone()) {
                warn!("DELIVERY_FAILED connection={} error={}", conn.connection_id, e);
                failed.push(conn.connection_id.clone());
            }
        }

        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
        for id in failed {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
            self.unregister(&id);
        }
    }

    // ============================================================================================
    // LIVENESS
    // ============================================================================================

    /// Close every connection idle past the timeout. Called by the sweep
    /// timer; safe to invoke concurrently with message handling.
    pub fn sweep_idle(&self) -> usize {
        let timeout_ms = self.config.idle_timeout.as_millis() as u64;
        let stale: Vec<ConnectionId> = {
            let connections = self.connections.read();
            connections
                .values()
                .filter(|c| c.idle_ms() > timeout_ms)
                .map(|c| c.connection_id.clone())
                .collect()
        };

        for id in &stale {
            info!("CONNECTION_IDLE_CLOSED connection={}", id);
            self.unregister(id);
        }
        stale.len()
    }

    /// Periodic sweep task. Runs until shutdown.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.sweep_interval);
        // The first tick fires immediately; skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let closed = self.sweep_idle();
                    if closed > 0 {
                        info!("HEARTBEAT_SWEEP closed={}", closed);
                    }
                }
                _ = shutdown.wait_for(|s| *s) => return,
            }
        }
    }

    // ============================================================================================
    // TRANSPORT
    // ============================================================================================

    /// Accept loop: newline-delimited JSON over persistent TCP connections.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let bound = listener.local_addr()?;
        *self.local_addr.write() = Some(bound);
        info!("SERVER_LISTENING addr={}", bound);

        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("CONNECTION_ACCEPTED peer={}", peer);
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                server.handle_socket(stream).await;
                            });
                        }
                        Err(e) => error!("ACCEPT_FAILED error={}", e),
                    }
                }
                _ = shutdown.wait_for(|s| *s) => {
                    info!("SERVER_STOPPING addr={}", self.config.bind_addr);
                    return Ok(());
                }
            }
        }
    }

    /// Drive one TCP connection: read frames, hand them to the server core,
    /// write queued outbound messages.
    async fn handle_socket(self: Arc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = self.register(tx);
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(message) = outbound else { break };
                    match serde_json::to_string(&message) {
                        Ok(mut frame) => {
                            frame.push('\n');
                            if write_half.write_all(frame.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("FRAME_ENCODE_FAILED error={}", e),
                    }
                }
                inbound = lines.next_line() => {
                    let line = match inbound {
                        Ok(Some(line)) => line,
                        // EOF or read error: client went away
                        _ => break,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ClientMessage>(&line) {
                        Ok(message) => {
                            if let Err(e) = self.handle_message(&conn, message) {
                                // Authentication failures close the connection
                                warn!(
                                    "CONNECTION_REJECTED connection={} reason={}",
                                    conn.connection_id, e
                                );
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = conn.send(ServerMessage::error(format!(
                                "malformed message: {}",
                                e
                            )));
                        }
                    }
                }
                _ = conn.wait_closed() => break,
                // The wrapper drops the watch guard inside the branch; the
                // select output would otherwise carry it across the write
                // above and the spawned task would not be Send.
                _ = async {
                    let _ = shutdown.wait_for(|s| *s).await;
                } => break,
            }
        }

        // Flush frames queued before teardown. A rejected auth attempt has
        // its error frame already on the channel; skipping this would leave
        // the client with a bare EOF and no reason.
        while let Ok(message) = rx.try_recv() {
            let Ok(mut frame) = serde_json::to_string(&message) else {
                continue;
            };
            frame.push('\n');
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }

        self.unregister(&conn.connection_id);
    }

    // ============================================================================================
    // SHUTDOWN & STATS
    // ============================================================================================

    /// Stop the accept loop and timers and close all open connections.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let ids: Vec<ConnectionId> = self.connections.read().keys().cloned().collect();
        for id in ids {
            self.unregister(&id);
        }
        self.audit.flush();
        info!("SERVER_SHUTDOWN complete");
    }

    pub fn stats(&self) -> ServerStats {
        let connections = self.connections.read();
        ServerStats {
            connections: connections.len(),
            authenticated: connections.values().filter(|c| c.is_authenticated()).count(),
            topics: self.topic_index.read().len(),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
