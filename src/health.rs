//! Per-vehicle integration health rollup.
//!
//! A `VehicleIntegrationStatus` is created lazily on the first telemetry or
//! diagnostic touch for a vehicle. Status follows the connected-systems set
//! (0 → inactive, 1-2 → partial, ≥3 → active) except that a processing error
//! pins the record to `Error` until the next successful pipeline run clears
//! it.

use crate::arena::KeyedArena;
use crate::collaborators::{AlertSink, DeviceManager};
use crate::types::{
    DiagnosticEvent, IntegrationState, TelemetrySample, VehicleIntegrationStatus,
};
use chrono::Utc;
use log::debug;
use std::sync::Arc;

/// Smoothing factor for the rolling data-quality score.
const QUALITY_ALPHA: f64 = 0.2;

pub struct IntegrationHealthTracker {
    devices: Arc<dyn DeviceManager>,
    alerts: Arc<dyn AlertSink>,
    statuses: KeyedArena<VehicleIntegrationStatus>,
}

impl IntegrationHealthTracker {
    pub fn new(devices: Arc<dyn DeviceManager>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            devices,
            alerts,
            statuses: KeyedArena::new(),
        }
    }

    fn blank(vehicle_id: &str) -> VehicleIntegrationStatus {
        VehicleIntegrationStatus {
            vehicle_id: vehicle_id.to_string(),
            device_id: None,
            state: IntegrationState::Inactive,
            telemetry_processed: 0,
            diagnostics_processed: 0,
            alerts_processed: 0,
            violations_detected: 0,
            device_health: 0.0,
            data_quality: 0.0,
            alert_response_ratio: 1.0,
            connected_systems: Default::default(),
            last_error: None,
            last_sync_at: Utc::now(),
        }
    }

    /// Update the rollup for one telemetry sample.
    pub fn record_telemetry(&self, sample: &TelemetrySample) {
        let device_health = self.devices.device_health(&sample.device_id);

        self.with_status(&sample.vehicle_id, |status| {
            status.telemetry_processed += 1;
            status.last_sync_at = Utc::now();
            status.connected_systems.insert("telemetry".to_string());

            status.data_quality = if status.telemetry_processed == 1 {
                sample.data_quality
            } else {
                (1.0 - QUALITY_ALPHA) * status.data_quality + QUALITY_ALPHA * sample.data_quality
            };

            status.device_id = Some(sample.device_id.clone());
            if let Some(health) = device_health {
                status.device_health = health.uptime;
                status.connected_systems.insert("device".to_string());
            }

            refresh_state(status);
        });
    }

    /// Update the rollup for one diagnostic event.
    pub fn record_diagnostic(&self, event: &DiagnosticEvent) {
        self.with_status(&event.vehicle_id, |status| {
            status.diagnostics_processed += 1;
            status.last_sync_at = Utc::now();
            status.connected_systems.insert("diagnostics".to_string());
            refresh_state(status);
        });
    }

    /// Count an alert raised for this vehicle and refresh the response ratio.
    pub fn record_alert(&self, vehicle_id: &str) {
        let open_alerts = self.alerts.active_alerts(vehicle_id).len() as f64;
        self.with_status(vehicle_id, |status| {
            status.alerts_processed += 1;
            status.connected_systems.insert("alerts".to_string());
            let raised = status.alerts_processed as f64;
            status.alert_response_ratio = ((raised - open_alerts) / raised).clamp(0.0, 1.0);
            refresh_state(status);
        });
    }

    pub fn record_violation(&self, vehicle_id: &str) {
        self.with_status(vehicle_id, |status| {
            status.violations_detected += 1;
        });
    }

    /// Force the vehicle into the error state, retaining the message.
    pub fn mark_error(&self, vehicle_id: &str, message: &str) {
        debug!("HEALTH_ERROR vehicle={} message={}", vehicle_id, message);
        self.with_status(vehicle_id, |status| {
            status.state = IntegrationState::Error;
            status.last_error = Some(message.to_string());
        });
    }

    /// Clear a standing error after a fully successful pipeline run.
    pub fn clear_error(&self, vehicle_id: &str) {
        self.with_status(vehicle_id, |status| {
            if status.state == IntegrationState::Error {
                status.last_error = None;
                status.state = status.state_from_systems();
            }
        });
    }

    pub fn status_for(&self, vehicle_id: &str) -> Option<VehicleIntegrationStatus> {
        self.statuses.get_cloned(vehicle_id)
    }

    /// Ids of every vehicle with an integration record.
    pub fn vehicle_ids(&self) -> Vec<String> {
        self.statuses.keys()
    }

    pub fn tracked_vehicles(&self) -> usize {
        self.statuses.len()
    }

    fn with_status(&self, vehicle_id: &str, f: impl FnOnce(&mut VehicleIntegrationStatus)) {
        let slot = self
            .statuses
            .get_or_insert_with(vehicle_id, || Self::blank(vehicle_id));
        let mut status = slot.lock();
        f(&mut status);
    }
}

/// Recompute the systems-derived state unless an error is pinned.
fn refresh_state(status: &mut VehicleIntegrationStatus) {
    if status.state != IntegrationState::Error {
        status.state = status.state_from_systems();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Alert, DeviceHealth};
    use crate::error::Result;
    use crate::types::{DiagnosticSeverity, DiagnosticStatus, GpsPosition};

    struct NoDevices;
    impl DeviceManager for NoDevices {
        fn device_health(&self, _device_id: &str) -> Option<DeviceHealth> {
            None
        }
    }

    struct HealthyDevices;
    impl DeviceManager for HealthyDevices {
        fn device_health(&self, _device_id: &str) -> Option<DeviceHealth> {
            Some(DeviceHealth {
                uptime: 0.99,
                data_quality: 0.97,
            })
        }
    }

    struct NoAlerts;
    impl AlertSink for NoAlerts {
        fn process_anomaly_alert(&self, _vehicle_id: &str, _message: &str) -> Result<String> {
            Ok("a1".to_string())
        }
        fn process_diagnostic_alert(&self, _event: &DiagnosticEvent) -> Result<String> {
            Ok("a2".to_string())
        }
        fn active_alerts(&self, _vehicle_id: &str) -> Vec<Alert> {
            vec![]
        }
    }

    fn sample() -> TelemetrySample {
        TelemetrySample {
            vehicle_id: "v1".to_string(),
            device_id: "d1".to_string(),
            driver_id: None,
            position: GpsPosition {
                latitude: 14.6,
                longitude: 121.0,
                accuracy_m: 5.0,
            },
            speed_kph: 40.0,
            engine_rpm: 2000.0,
            engine_load_pct: 40.0,
            engine_temp_c: 90.0,
            coolant_temp_c: 85.0,
            fuel_level_pct: 60.0,
            fuel_rate_lph: 6.0,
            battery_voltage: 13.8,
            oil_pressure_kpa: 300.0,
            odometer_km: 52_000.0,
            harsh_acceleration: 0,
            harsh_braking: 0,
            active_dtcs: vec![],
            pending_dtcs: vec![],
            data_quality: 0.9,
            recorded_at: Utc::now(),
            received_at: Utc::now(),
        }
    }

    fn diagnostic() -> DiagnosticEvent {
        DiagnosticEvent {
            vehicle_id: "v1".to_string(),
            device_id: "d1".to_string(),
            code: "P0301".to_string(),
            severity: DiagnosticSeverity::Error,
            description: "misfire".to_string(),
            position: None,
            odometer_km: 52_000.0,
            safety_impact: false,
            performance_impact: true,
            status: DiagnosticStatus::Active,
            occurrence_count: 1,
            first_occurred_at: Utc::now(),
            last_occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_lazy_creation_and_counters() {
        let tracker = IntegrationHealthTracker::new(Arc::new(NoDevices), Arc::new(NoAlerts));
        assert!(tracker.status_for("v1").is_none());

        tracker.record_telemetry(&sample());
        tracker.record_telemetry(&sample());

        let status = tracker.status_for("v1").unwrap();
        assert_eq!(status.telemetry_processed, 2);
        assert_eq!(status.state, IntegrationState::Partial);
        assert!((status.data_quality - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_three_systems_make_active() {
        let tracker = IntegrationHealthTracker::new(Arc::new(NoDevices), Arc::new(NoAlerts));
        tracker.record_telemetry(&sample());
        tracker.record_diagnostic(&diagnostic());
        assert_eq!(
            tracker.status_for("v1").unwrap().state,
            IntegrationState::Partial
        );
        tracker.record_alert("v1");
        assert_eq!(
            tracker.status_for("v1").unwrap().state,
            IntegrationState::Active
        );
    }

    #[test]
    fn test_device_health_binds_device_system() {
        let tracker = IntegrationHealthTracker::new(Arc::new(HealthyDevices), Arc::new(NoAlerts));
        tracker.record_telemetry(&sample());
        let status = tracker.status_for("v1").unwrap();
        assert_eq!(status.device_health, 0.99);
        assert!(status.connected_systems.contains("device"));
        assert_eq!(status.state, IntegrationState::Partial);
    }

    #[test]
    fn test_error_pins_until_cleared() {
        let tracker = IntegrationHealthTracker::new(Arc::new(NoDevices), Arc::new(NoAlerts));
        tracker.record_telemetry(&sample());
        tracker.mark_error("v1", "compliance stage failed");

        // New touches do not lift the error
        tracker.record_telemetry(&sample());
        let status = tracker.status_for("v1").unwrap();
        assert_eq!(status.state, IntegrationState::Error);
        assert!(status.last_error.is_some());

        tracker.clear_error("v1");
        let status = tracker.status_for("v1").unwrap();
        assert_eq!(status.state, IntegrationState::Partial);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_error_on_unseen_vehicle_creates_record() {
        let tracker = IntegrationHealthTracker::new(Arc::new(NoDevices), Arc::new(NoAlerts));
        tracker.mark_error("ghost", "pipeline failure");
        assert_eq!(
            tracker.status_for("ghost").unwrap().state,
            IntegrationState::Error
        );
    }
}
