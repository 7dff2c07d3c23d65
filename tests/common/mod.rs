//! Shared harness for integration tests: a fully wired stack backed by the
//! in-memory collaborator adapters, plus sample/record builders.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentinel::audit::AuditLog;
use sentinel::broadcast::{ClientMessage, ClientMessageKind, ServerMessage};
use sentinel::collaborators::{
    AuthGrant, InMemoryAlertSink, InMemoryDeviceManager, InMemoryVehicleDirectory,
    NeutralAnalytics, RegionScope, StaticAuthProvider, VehicleRecord,
};
use sentinel::types::{
    DiagnosticEvent, DiagnosticSeverity, DiagnosticStatus, GpsPosition, TelemetrySample,
    VehicleType,
};
use sentinel::{
    ComplianceConfig, ComplianceRuleEngine, DriverSessionTracker, IntegrationHealthTracker,
    MaintenanceRecommendationEngine, MaintenanceThresholds, RealtimeBroadcastServer,
    ServerConfig, SessionConfig, TelemetryIngestionPipeline,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Harness {
    pub auth: Arc<StaticAuthProvider>,
    pub directory: Arc<InMemoryVehicleDirectory>,
    pub devices: Arc<InMemoryDeviceManager>,
    pub alerts: Arc<InMemoryAlertSink>,
    pub compliance: Arc<ComplianceRuleEngine>,
    pub maintenance: Arc<MaintenanceRecommendationEngine>,
    pub sessions: Arc<DriverSessionTracker>,
    pub health: Arc<IntegrationHealthTracker>,
    pub server: Arc<RealtimeBroadcastServer>,
    pub pipeline: Arc<TelemetryIngestionPipeline>,
}

pub fn harness() -> Harness {
    harness_with_config(ServerConfig::default())
}

pub fn harness_with_config(server_config: ServerConfig) -> Harness {
    let auth = Arc::new(StaticAuthProvider::new());
    let directory = Arc::new(InMemoryVehicleDirectory::new());
    let devices = Arc::new(InMemoryDeviceManager::new());
    let alerts = Arc::new(InMemoryAlertSink::new());
    let audit = Arc::new(AuditLog::disabled());

    let compliance = Arc::new(ComplianceRuleEngine::new(
        Arc::new(ComplianceConfig::default()),
        directory.clone(),
    ));
    let maintenance = Arc::new(MaintenanceRecommendationEngine::new(
        MaintenanceThresholds::default(),
    ));
    let sessions = Arc::new(DriverSessionTracker::new(
        SessionConfig::default(),
        Arc::new(NeutralAnalytics),
    ));
    let health = Arc::new(IntegrationHealthTracker::new(
        devices.clone(),
        alerts.clone(),
    ));
    let server = Arc::new(RealtimeBroadcastServer::new(
        server_config,
        auth.clone(),
        directory.clone(),
        Arc::clone(&health),
        Arc::clone(&audit),
    ));
    let pipeline = Arc::new(TelemetryIngestionPipeline::new(
        Arc::clone(&compliance),
        Arc::clone(&maintenance),
        Arc::clone(&sessions),
        Arc::clone(&health),
        Arc::clone(&server),
        alerts.clone(),
        audit,
    ));

    Harness {
        auth,
        directory,
        devices,
        alerts,
        compliance,
        maintenance,
        sessions,
        health,
        server,
        pipeline,
    }
}

// ================================================================================================
// BUILDERS
// ================================================================================================

pub fn grant(user_id: &str, permissions: &[&str], scope: RegionScope) -> AuthGrant {
    AuthGrant {
        user_id: user_id.to_string(),
        permissions: permissions
            .iter()
            .map(|p| p.to_string())
            .collect::<BTreeSet<_>>(),
        region_scope: scope,
    }
}

pub fn vehicle(vehicle_id: &str, plate: &str, region: &str) -> VehicleRecord {
    let next_year = Utc::now() + Duration::days(365);
    VehicleRecord {
        vehicle_id: vehicle_id.to_string(),
        plate_number: plate.to_string(),
        vehicle_type: VehicleType::PrivateCar,
        home_region: region.to_string(),
        operator_id: Some("op-1".to_string()),
        franchise_expiry: Some(next_year),
        registration_expiry: Some(next_year),
        driver_license_expiry: Some(next_year),
        inspection_expiry: Some(next_year),
        insurance_expiry: Some(next_year),
        route_authorized: true,
    }
}

/// 2026-03-01 is a Sunday; 04:00 UTC = 12:00 local. No coding window, no
/// truck ban, so only the value-driven rules can fire.
pub fn quiet_sunday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap()
}

pub fn sample(vehicle_id: &str, speed: f64, at: DateTime<Utc>) -> TelemetrySample {
    TelemetrySample {
        vehicle_id: vehicle_id.to_string(),
        device_id: "dev-1".to_string(),
        driver_id: Some("drv-1".to_string()),
        position: GpsPosition {
            latitude: 14.6,
            longitude: 121.0,
            accuracy_m: 5.0,
        },
        speed_kph: speed,
        engine_rpm: 2200.0,
        engine_load_pct: 45.0,
        engine_temp_c: 90.0,
        coolant_temp_c: 85.0,
        fuel_level_pct: 55.0,
        fuel_rate_lph: 7.0,
        battery_voltage: 13.6,
        oil_pressure_kpa: 320.0,
        odometer_km: 48_000.0,
        harsh_acceleration: 0,
        harsh_braking: 0,
        active_dtcs: vec![],
        pending_dtcs: vec![],
        data_quality: 0.95,
        recorded_at: at,
        received_at: at,
    }
}

pub fn diagnostic(vehicle_id: &str, code: &str, severity: DiagnosticSeverity) -> DiagnosticEvent {
    let now = Utc::now();
    DiagnosticEvent {
        vehicle_id: vehicle_id.to_string(),
        device_id: "dev-1".to_string(),
        code: code.to_string(),
        severity,
        description: "test diagnostic".to_string(),
        position: None,
        odometer_km: 48_000.0,
        safety_impact: false,
        performance_impact: true,
        status: DiagnosticStatus::Active,
        occurrence_count: 1,
        first_occurred_at: now,
        last_occurred_at: now,
    }
}

// ================================================================================================
// CLIENT HELPERS
// ================================================================================================

/// A test client wired straight into the server core, no socket involved.
pub struct TestClient {
    pub conn: Arc<sentinel::broadcast::ClientConnection>,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
}

pub fn connect(server: &Arc<RealtimeBroadcastServer>) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = server.register(tx);
    TestClient { conn, rx }
}

pub fn client_message(kind: ClientMessageKind, payload: Value) -> ClientMessage {
    ClientMessage {
        kind,
        payload,
        message_id: None,
    }
}

pub fn auth_message(token: &str, user_id: &str) -> ClientMessage {
    client_message(
        ClientMessageKind::Auth,
        json!({ "token": token, "userId": user_id }),
    )
}

pub fn subscribe_message(topics: &[&str]) -> ClientMessage {
    client_message(ClientMessageKind::Subscribe, json!({ "topics": topics }))
}

impl TestClient {
    /// Drain everything currently queued for this client.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}
