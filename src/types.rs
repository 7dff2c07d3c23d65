//! Core data model for the telemetry analysis pipeline.
//!
//! Every entity that flows between the analyzers and the broadcast server is
//! defined here. Samples are immutable once constructed: one sample = one
//! pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ================================================================================================
// TELEMETRY
// ================================================================================================

/// GPS fix attached to a telemetry sample.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy_m: f64,
}

/// One decoded OBD telemetry sample.
///
/// Produced by the device gateway (wire decoding is out of scope here) and
/// handed to the ingestion pipeline as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub vehicle_id: String,
    pub device_id: String,
    pub driver_id: Option<String>,
    pub position: GpsPosition,
    /// Road speed in km/h
    pub speed_kph: f64,
    pub engine_rpm: f64,
    /// Engine load percentage (0-100)
    pub engine_load_pct: f64,
    /// Engine temperature in °C
    pub engine_temp_c: f64,
    pub coolant_temp_c: f64,
    /// Fuel level percentage (0-100)
    pub fuel_level_pct: f64,
    /// Instantaneous fuel rate in liters/hour
    pub fuel_rate_lph: f64,
    pub battery_voltage: f64,
    pub oil_pressure_kpa: f64,
    pub odometer_km: f64,
    /// Harsh acceleration events since the previous sample
    pub harsh_acceleration: u32,
    /// Harsh braking events since the previous sample
    pub harsh_braking: u32,
    /// Active diagnostic trouble codes at sample time
    pub active_dtcs: Vec<String>,
    /// Pending (not yet confirmed) trouble codes
    pub pending_dtcs: Vec<String>,
    /// Device-reported data quality score (0.0 - 1.0)
    pub data_quality: f64,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl TelemetrySample {
    /// Total harsh events carried by this sample.
    pub fn harsh_events(&self) -> u32 {
        self.harsh_acceleration + self.harsh_braking
    }
}

/// Vehicle classification used by zone and prohibited-hours rules.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    PrivateCar,
    Motorcycle,
    Truck,
    Bus,
    Jeepney,
    Taxi,
}

// ================================================================================================
// DIAGNOSTICS
// ================================================================================================

/// Severity reported with a diagnostic trouble code.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Lifecycle status of a diagnostic event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Active,
    Acknowledged,
    Resolved,
}

/// A diagnostic trouble code reported by the OBD device.
///
/// Recurrences of the same code for the same vehicle merge into the existing
/// event: `occurrence_count` increments and `last_occurred_at` advances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub vehicle_id: String,
    pub device_id: String,
    /// Standard DTC, e.g. "P0301"
    pub code: String,
    pub severity: DiagnosticSeverity,
    pub description: String,
    pub position: Option<GpsPosition>,
    pub odometer_km: f64,
    pub safety_impact: bool,
    pub performance_impact: bool,
    pub status: DiagnosticStatus,
    pub occurrence_count: u32,
    pub first_occurred_at: DateTime<Utc>,
    pub last_occurred_at: DateTime<Utc>,
}

impl DiagnosticEvent {
    /// Fold a recurrence of the same code into this event.
    pub fn merge_recurrence(&mut self, occurred_at: DateTime<Utc>) {
        self.occurrence_count += 1;
        if occurred_at > self.last_occurred_at {
            self.last_occurred_at = occurred_at;
        }
    }
}

// ================================================================================================
// TRAFFIC VIOLATIONS
// ================================================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Speeding,
    CodingViolation,
    RestrictedZone,
    TimeRestriction,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Minor,
    Major,
    Serious,
}

/// Violation lifecycle. Created as `Detected`; transitions past that are
/// driven by the external enforcement workflow. `Paid` and `Dismissed` are
/// terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Detected,
    Verified,
    Contested,
    Paid,
    Dismissed,
}

/// A traffic violation produced by the compliance rule engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficViolation {
    pub violation_id: String,
    pub vehicle_id: String,
    pub driver_id: Option<String>,
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    pub position: GpsPosition,
    pub region: String,
    pub fine_amount: f64,
    pub penalty_points: u32,
    /// Snapshot of the evidence backing the detection (recorded speed, the
    /// limit used, the window matched, ...). Shape varies per violation type.
    pub evidence: serde_json::Value,
    pub status: ViolationStatus,
    pub detected_at: DateTime<Utc>,
}

// ================================================================================================
// REGULATORY COMPLIANCE
// ================================================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceItemStatus {
    Compliant,
    Warning,
    NonCompliant,
    Expired,
}

/// One named item inside a periodic compliance check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceItem {
    /// Stable item name, e.g. "franchise_validity"
    pub name: String,
    pub status: ComplianceItemStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Days until expiry (negative when already expired)
    pub days_remaining: Option<i64>,
    pub required_action: Option<String>,
}

/// Result of an LTFRB-style regulatory compliance check for one vehicle.
///
/// Superseded by the latest check per vehicle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub vehicle_id: String,
    pub check_date: DateTime<Utc>,
    pub items: Vec<ComplianceItem>,
    /// (# compliant items) / (total items) × 100
    pub score: f64,
    pub overall_status: ComplianceItemStatus,
    pub next_check_at: DateTime<Utc>,
}

// ================================================================================================
// MAINTENANCE
// ================================================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Preventive,
    Corrective,
    Predictive,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Minor,
    Major,
    Urgent,
    Critical,
}

/// What triggered a maintenance recommendation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecommendationEvidence {
    Telemetry { metric: String, value: f64, threshold: f64 },
    DiagnosticCode { code: String, occurrences: u32 },
    Mileage { odometer_km: f64, interval_km: f64 },
}

/// A maintenance recommendation. Deduplicated per vehicle by
/// (component, recommendation_type); never auto-removed by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaintenanceRecommendation {
    pub recommendation_id: String,
    pub vehicle_id: String,
    pub recommendation_type: RecommendationType,
    /// Affected component, e.g. "cooling_system"
    pub component: String,
    pub priority: RecommendationPriority,
    pub description: String,
    pub estimated_cost: f64,
    /// Suggested service window in days
    pub urgency_days: u32,
    pub evidence: RecommendationEvidence,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

// ================================================================================================
// DRIVER SESSIONS
// ================================================================================================

/// Final scores pulled from the analytics collaborator when a session ends.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SessionScores {
    pub eco_score: f64,
    pub safety_score: f64,
    pub fuel_efficiency: f64,
}

/// One driver/vehicle trip. Exactly one active session per
/// (driver_id, vehicle_id) pair; frozen after end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverSession {
    pub session_id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated travel distance in km
    pub distance_km: f64,
    pub max_speed_kph: f64,
    /// Monotonically increasing while active
    pub harsh_events: u32,
    /// Seconds spent below the idle threshold, monotonically increasing
    pub idle_time_s: u64,
    /// Violation types observed during the session (set semantics)
    pub violation_types: BTreeSet<ViolationType>,
    /// Alert ids raised while the session was active
    pub alert_ids: Vec<String>,
    pub scores: Option<SessionScores>,
}

// ================================================================================================
// INTEGRATION HEALTH
// ================================================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationState {
    Inactive,
    Partial,
    Active,
    Error,
}

/// Per-vehicle rollup of pipeline health. Created lazily on first sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleIntegrationStatus {
    pub vehicle_id: String,
    pub device_id: Option<String>,
    pub state: IntegrationState,
    pub telemetry_processed: u64,
    pub diagnostics_processed: u64,
    pub alerts_processed: u64,
    pub violations_detected: u64,
    /// Device uptime score (0.0 - 1.0), from the device manager
    pub device_health: f64,
    /// Rolling data-quality score (0.0 - 1.0)
    pub data_quality: f64,
    /// Ratio of responded alerts to raised alerts (0.0 - 1.0)
    pub alert_response_ratio: f64,
    /// Subsystems currently feeding this vehicle's record
    pub connected_systems: BTreeSet<String>,
    pub last_error: Option<String>,
    pub last_sync_at: DateTime<Utc>,
}

impl VehicleIntegrationStatus {
    /// State implied by the connected-systems set alone. The error override
    /// in the health tracker takes precedence over this.
    pub fn state_from_systems(&self) -> IntegrationState {
        match self.connected_systems.len() {
            0 => IntegrationState::Inactive,
            1 | 2 => IntegrationState::Partial,
            _ => IntegrationState::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn status(systems: &[&str]) -> VehicleIntegrationStatus {
        VehicleIntegrationStatus {
            vehicle_id: "v1".to_string(),
            device_id: None,
            state: IntegrationState::Inactive,
            telemetry_processed: 0,
            diagnostics_processed: 0,
            alerts_processed: 0,
            violations_detected: 0,
            device_health: 0.0,
            data_quality: 0.0,
            alert_response_ratio: 0.0,
            connected_systems: systems.iter().map(|s| s.to_string()).collect(),
            last_error: None,
            last_sync_at: Utc::now(),
        }
    }

    #[test]
    fn test_state_from_systems_tiers() {
        assert_eq!(status(&[]).state_from_systems(), IntegrationState::Inactive);
        assert_eq!(
            status(&["telemetry"]).state_from_systems(),
            IntegrationState::Partial
        );
        assert_eq!(
            status(&["telemetry", "diagnostics"]).state_from_systems(),
            IntegrationState::Partial
        );
        assert_eq!(
            status(&["telemetry", "diagnostics", "alerts"]).state_from_systems(),
            IntegrationState::Active
        );
    }

    #[test]
    fn test_diagnostic_merge_recurrence() {
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();

        let mut event = DiagnosticEvent {
            vehicle_id: "v1".to_string(),
            device_id: "d1".to_string(),
            code: "P0301".to_string(),
            severity: DiagnosticSeverity::Error,
            description: "Cylinder 1 misfire".to_string(),
            position: None,
            odometer_km: 120_000.0,
            safety_impact: true,
            performance_impact: true,
            status: DiagnosticStatus::Active,
            occurrence_count: 1,
            first_occurred_at: first,
            last_occurred_at: first,
        };

        event.merge_recurrence(later);
        assert_eq!(event.occurrence_count, 2);
        assert_eq!(event.last_occurred_at, later);

        // An out-of-order recurrence still counts but never rewinds the clock
        event.merge_recurrence(first);
        assert_eq!(event.occurrence_count, 3);
        assert_eq!(event.last_occurred_at, later);
    }

    #[test]
    fn test_violation_serializes_snake_case() {
        let json = serde_json::to_string(&ViolationType::CodingViolation).unwrap();
        assert_eq!(json, "\"coding_violation\"");
        let sev: ViolationSeverity = serde_json::from_str("\"serious\"").unwrap();
        assert_eq!(sev, ViolationSeverity::Serious);
    }

    #[test]
    fn test_violation_type_set_membership() {
        // Session tracking stores violation types in an ordered set
        let mut types = std::collections::BTreeSet::new();
        types.insert(ViolationType::Speeding);
        types.insert(ViolationType::CodingViolation);
        types.insert(ViolationType::Speeding);
        assert_eq!(types.len(), 2);
        assert!(types.contains(&ViolationType::CodingViolation));
    }
}
