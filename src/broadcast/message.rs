//! Wire protocol messages.
//!
//! One JSON object per frame in both directions. Field names follow the
//! camelCase convention of the client SDKs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message types a client may send.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessageKind {
    Auth,
    Subscribe,
    Unsubscribe,
    Request,
    Ping,
}

/// A decoded client frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: ClientMessageKind,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// `auth` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// `subscribe`/`unsubscribe` payload. Topics may be given directly as
/// `kind:identifier` strings, or implied by vehicle ids and data types.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscribePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(rename = "vehicleIds", default, skip_serializing_if = "Option::is_none")]
    pub vehicle_ids: Option<Vec<String>>,
    #[serde(rename = "dataTypes", default, skip_serializing_if = "Option::is_none")]
    pub data_types: Option<Vec<String>>,
}

/// `request` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(rename = "requestType")]
    pub request_type: RequestType,
    #[serde(rename = "vehicleId")]
    pub vehicle_id: String,
    #[serde(rename = "timeRange", default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<Value>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    LatestTelemetry,
    DeviceStatus,
    HistoricalData,
}

/// Message types the server emits.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessageKind {
    Telemetry,
    Diagnostic,
    Alert,
    DeviceStatus,
    System,
    Response,
    Pong,
    Error,
}

/// An outbound server frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: ServerMessageKind,
    #[serde(rename = "vehicleId", default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

impl ServerMessage {
    pub fn new(kind: ServerMessageKind, vehicle_id: Option<String>, data: Value) -> Self {
        Self {
            kind,
            vehicle_id,
            data,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn response(data: Value, in_reply_to: Option<&str>) -> Self {
        let mut msg = Self::new(ServerMessageKind::Response, None, data);
        if let Some(id) = in_reply_to {
            msg.message_id = id.to_string();
        }
        msg
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(
            ServerMessageKind::Error,
            None,
            serde_json::json!({ "error": reason.into() }),
        )
    }

    pub fn pong() -> Self {
        Self::new(ServerMessageKind::Pong, None, Value::Null)
    }
}
