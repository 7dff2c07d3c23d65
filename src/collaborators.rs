//! Trait seams for the external systems this core consumes.
//!
//! Persistence, alerting, device management, analytics and token validation
//! all live outside this crate. The pipeline and server only ever see these
//! narrow interfaces; tests and the wiring layer supply the implementations.

use crate::error::Result;
use crate::types::{DiagnosticEvent, SessionScores, VehicleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ================================================================================================
// AUTHENTICATION
// ================================================================================================

/// Regional visibility attached to an authenticated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionScope {
    /// Administrative scope: no regional restriction.
    All,
    /// Restricted to the listed regions.
    Limited(BTreeSet<String>),
}

impl RegionScope {
    pub fn allows(&self, region: &str) -> bool {
        match self {
            RegionScope::All => true,
            RegionScope::Limited(regions) => regions.contains(region),
        }
    }
}

/// Permissions and scope fetched once per connection on successful auth.
#[derive(Clone, Debug)]
pub struct AuthGrant {
    pub user_id: String,
    pub permissions: BTreeSet<String>,
    pub region_scope: RegionScope,
}

impl AuthGrant {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Token validation + permission lookup. Token *issuance* is out of scope.
pub trait AuthProvider: Send + Sync {
    /// Validate `token` for `user_id`, returning the cached-for-lifetime
    /// grant, or `SentinelError::Authentication` on a bad/expired token.
    fn validate_token(&self, token: &str, user_id: &str) -> Result<AuthGrant>;
}

// ================================================================================================
// VEHICLE DIRECTORY
// ================================================================================================

/// Registry facts about one vehicle, as held by the fleet directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vehicle_id: String,
    pub plate_number: String,
    pub vehicle_type: VehicleType,
    /// Region the vehicle is registered to; authorization checks key off this
    pub home_region: String,
    pub operator_id: Option<String>,
    pub franchise_expiry: Option<DateTime<Utc>>,
    pub registration_expiry: Option<DateTime<Utc>>,
    pub driver_license_expiry: Option<DateTime<Utc>>,
    pub inspection_expiry: Option<DateTime<Utc>>,
    pub insurance_expiry: Option<DateTime<Utc>>,
    pub route_authorized: bool,
}

/// Per-vehicle region/plate/type lookup.
pub trait VehicleDirectory: Send + Sync {
    fn lookup(&self, vehicle_id: &str) -> Option<VehicleRecord>;
}

// ================================================================================================
// DEVICE MANAGER
// ================================================================================================

/// Health snapshot for one OBD device.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DeviceHealth {
    /// Uptime ratio over the reporting window (0.0 - 1.0)
    pub uptime: f64,
    /// Device-side data quality (0.0 - 1.0)
    pub data_quality: f64,
}

/// OBD device health lookup.
pub trait DeviceManager: Send + Sync {
    fn device_health(&self, device_id: &str) -> Option<DeviceHealth>;
}

// ================================================================================================
// ALERTS
// ================================================================================================

/// An alert surfaced by the alerting subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub vehicle_id: String,
    pub kind: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Alert raising and queries. Returned ids end up in session records and
/// broadcast payloads.
pub trait AlertSink: Send + Sync {
    fn process_anomaly_alert(&self, vehicle_id: &str, message: &str) -> Result<String>;
    fn process_diagnostic_alert(&self, event: &DiagnosticEvent) -> Result<String>;
    fn active_alerts(&self, vehicle_id: &str) -> Vec<Alert>;
}

// ================================================================================================
// ANALYTICS
// ================================================================================================

/// Aggregate driver performance metrics, pulled when a session ends.
pub trait AnalyticsProvider: Send + Sync {
    fn performance_metrics(&self, driver_id: &str, vehicle_id: &str) -> SessionScores;
}

// ================================================================================================
// IN-MEMORY ADAPTERS
// ================================================================================================

/// Token table keyed by `(token, user_id)`. Used by the server binary when
/// no external identity service is wired, and by integration tests.
#[derive(Default)]
pub struct StaticAuthProvider {
    grants: parking_lot::RwLock<HashMap<(String, String), AuthGrant>>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_grant(&self, token: &str, grant: AuthGrant) {
        self.grants
            .write()
            .insert((token.to_string(), grant.user_id.clone()), grant);
    }
}

impl AuthProvider for StaticAuthProvider {
    fn validate_token(&self, token: &str, user_id: &str) -> Result<AuthGrant> {
        self.grants
            .read()
            .get(&(token.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                crate::error::SentinelError::Authentication(format!(
                    "invalid token for user {}",
                    user_id
                ))
            })
    }
}

/// In-memory vehicle registry.
#[derive(Default)]
pub struct InMemoryVehicleDirectory {
    records: parking_lot::RwLock<HashMap<String, VehicleRecord>>,
}

impl InMemoryVehicleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: VehicleRecord) {
        self.records
            .write()
            .insert(record.vehicle_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl VehicleDirectory for InMemoryVehicleDirectory {
    fn lookup(&self, vehicle_id: &str) -> Option<VehicleRecord> {
        self.records.read().get(vehicle_id).cloned()
    }
}

/// In-memory device registry with per-device health snapshots.
#[derive(Default)]
pub struct InMemoryDeviceManager {
    health: parking_lot::RwLock<HashMap<String, DeviceHealth>>,
}

impl InMemoryDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, device_id: &str, health: DeviceHealth) {
        self.health.write().insert(device_id.to_string(), health);
    }
}

impl DeviceManager for InMemoryDeviceManager {
    fn device_health(&self, device_id: &str) -> Option<DeviceHealth> {
        self.health.read().get(device_id).copied()
    }
}

/// In-memory alert store. Every raise succeeds and stays active until the
/// store is dropped.
#[derive(Default)]
pub struct InMemoryAlertSink {
    alerts: parking_lot::RwLock<HashMap<String, Vec<Alert>>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn raise(&self, vehicle_id: &str, kind: &str, message: &str) -> String {
        let alert = Alert {
            alert_id: uuid::Uuid::new_v4().to_string(),
            vehicle_id: vehicle_id.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
            raised_at: Utc::now(),
        };
        let id = alert.alert_id.clone();
        self.alerts
            .write()
            .entry(vehicle_id.to_string())
            .or_default()
            .push(alert);
        id
    }
}

impl AlertSink for InMemoryAlertSink {
    fn process_anomaly_alert(&self, vehicle_id: &str, message: &str) -> Result<String> {
        Ok(self.raise(vehicle_id, "anomaly", message))
    }

    fn process_diagnostic_alert(&self, event: &DiagnosticEvent) -> Result<String> {
        Ok(self.raise(
            &event.vehicle_id,
            "diagnostic",
            &format!("{}: {}", event.code, event.description),
        ))
    }

    fn active_alerts(&self, vehicle_id: &str) -> Vec<Alert> {
        self.alerts
            .read()
            .get(vehicle_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Analytics stub returning zeroed scores. The real provider aggregates
/// historical driving data.
#[derive(Default)]
pub struct NeutralAnalytics;

impl AnalyticsProvider for NeutralAnalytics {
    fn performance_metrics(&self, _driver_id: &str, _vehicle_id: &str) -> SessionScores {
        SessionScores::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_scope_all_allows_everything() {
        assert!(RegionScope::All.allows("NCR"));
        assert!(RegionScope::All.allows("anywhere"));
    }

    #[test]
    fn test_region_scope_limited() {
        let scope = RegionScope::Limited(["NCR".to_string()].into_iter().collect());
        assert!(scope.allows("NCR"));
        assert!(!scope.allows("Region III"));
    }
}
