//! Periodic regulatory compliance re-check.
//!
//! Runs as a background task on a fixed interval, re-evaluating the six-item
//! regulatory checklist for every vehicle with an integration record.
//! Overlapping ticks are harmless: each cycle recomputes item states from
//! current expiry dates rather than accumulating deltas.

use crate::arena::KeyedArena;
use crate::compliance::ComplianceRuleEngine;
use crate::health::IntegrationHealthTracker;
use crate::types::{ComplianceCheck, ComplianceItemStatus};
use chrono::Utc;
use log::{error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

/// Configuration for the periodic compliance re-check.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between re-check cycles
    pub recheck_interval: Duration,
    /// Whether the scheduler is enabled
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_secs(60 * 60),
            enabled: true,
        }
    }
}

/// Summary of one re-check cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecheckStats {
    pub vehicles_checked: usize,
    pub non_compliant: usize,
    pub failures: usize,
    pub duration_ms: u64,
}

/// Background scheduler for regulatory compliance re-checks.
pub struct ComplianceRecheckScheduler {
    compliance: Arc<ComplianceRuleEngine>,
    health: Arc<IntegrationHealthTracker>,
    config: SchedulerConfig,
    /// Most recent completed check per vehicle; each cycle replaces it
    latest_checks: KeyedArena<ComplianceCheck>,
    last_recheck_at: RwLock<u64>,
    shutdown_tx: watch::Sender<bool>,
}

impl ComplianceRecheckScheduler {
    pub fn new(
        compliance: Arc<ComplianceRuleEngine>,
        health: Arc<IntegrationHealthTracker>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            compliance,
            health,
            config,
            latest_checks: KeyedArena::new(),
            last_recheck_at: RwLock::new(crate::types::now_ms()),
            shutdown_tx,
        }
    }

    /// Milliseconds since epoch of the last completed cycle, or
    /// initialization time if none has run yet.
    pub fn last_recheck(&self) -> u64 {
        *self.last_recheck_at.read()
    }

    /// Result of the most recent completed check for `vehicle_id`, if any
    /// cycle has covered it.
    pub fn latest_check(&self, vehicle_id: &str) -> Option<ComplianceCheck> {
        self.latest_checks.get_cloned(vehicle_id)
    }

    /// Run the scheduler until shutdown. Spawn as a tokio task.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("COMPLIANCE_RECHECK_DISABLED");
            return;
        }

        info!(
            "COMPLIANCE_RECHECK_STARTED interval_secs={}",
            self.config.recheck_interval.as_secs()
        );

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.recheck_interval);
        // The first tick completes immediately; skip it so the first real
        // cycle lands one interval after startup
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.run_cycle();
                    info!(
                        "COMPLIANCE_RECHECK_DONE vehicles={} non_compliant={} failures={} duration_ms={}",
                        stats.vehicles_checked,
                        stats.non_compliant,
                        stats.failures,
                        stats.duration_ms
                    );
                }
                _ = shutdown.wait_for(|s| *s) => {
                    info!("COMPLIANCE_RECHECK_STOPPED");
                    return;
                }
            }
        }
    }

    /// Stop the background task after its current cycle.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Re-check every tracked vehicle once.
    pub fn run_cycle(&self) -> RecheckStats {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let mut stats = RecheckStats::default();

        for vehicle_id in self.health.vehicle_ids() {
            stats.vehicles_checked += 1;
            match self.compliance.perform_compliance_check(&vehicle_id, now) {
                Ok(check) => {
                    if check.overall_status != ComplianceItemStatus::Compliant {
                        stats.non_compliant += 1;
                        warn!(
                            "COMPLIANCE_DEGRADED vehicle={} status={:?} score={:.0}",
                            vehicle_id, check.overall_status, check.score
                        );
                    }
                    let slot = self
                        .latest_checks
                        .get_or_insert_with(&vehicle_id, || check.clone());
                    *slot.lock() = check;
                }
                Err(e) => {
                    stats.failures += 1;
                    error!("COMPLIANCE_RECHECK_FAILED vehicle={} error={}", vehicle_id, e);
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        *self.last_recheck_at.write() = crate::types::now_ms();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        InMemoryAlertSink, InMemoryDeviceManager, InMemoryVehicleDirectory, VehicleRecord,
    };
    use crate::config::ComplianceConfig;
    use crate::types::{GpsPosition, TelemetrySample, VehicleType};
    use chrono::{DateTime, Duration as ChronoDuration};

    fn record(registration_expiry: DateTime<Utc>) -> VehicleRecord {
        let far = Utc::now() + ChronoDuration::days(365);
        VehicleRecord {
            vehicle_id: "v1".to_string(),
            plate_number: "ABC1234".to_string(),
            vehicle_type: VehicleType::PrivateCar,
            home_region: "NCR".to_string(),
            operator_id: Some("op-1".to_string()),
            franchise_expiry: Some(far),
            registration_expiry: Some(registration_expiry),
            driver_license_expiry: Some(far),
            inspection_expiry: Some(far),
            insurance_expiry: Some(far),
            route_authorized: true,
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
            data_quality: 0.95,
            recorded_at: Utc::now(),
            received_at: Utc::now(),
        }
    }

    fn scheduler_with(directory: Arc<InMemoryVehicleDirectory>) -> ComplianceRecheckScheduler {
        let compliance = Arc::new(ComplianceRuleEngine::new(
            Arc::new(ComplianceConfig::default()),
            directory,
        ));
        let health = Arc::new(IntegrationHealthTracker::new(
            Arc::new(InMemoryDeviceManager::new()),
            Arc::new(InMemoryAlertSink::new()),
        ));
        // One telemetry sample puts the vehicle on the recheck roster
        health.record_telemetry(&sample());
        ComplianceRecheckScheduler::new(compliance, health, SchedulerConfig::default())
    }

    #[test]
    fn test_latest_check_empty_before_first_cycle() {
        let directory = Arc::new(InMemoryVehicleDirectory::new());
        directory.upsert(record(Utc::now() + ChronoDuration::days(365)));
        let scheduler = scheduler_with(directory);

        assert!(scheduler.latest_check("v1").is_none());
    }

    #[test]
    fn test_recheck_supersedes_previous_result() {
        let directory = Arc::new(InMemoryVehicleDirectory::new());
        directory.upsert(record(Utc::now() + ChronoDuration::days(365)));
        let scheduler = scheduler_with(Arc::clone(&directory));

        scheduler.run_cycle();
        let first = scheduler.latest_check("v1").unwrap();
        assert_eq!(first.overall_status, ComplianceItemStatus::Compliant);
        assert_eq!(first.score, 100.0);

        // Registration lapses before the next cycle
        directory.upsert(record(Utc::now() - ChronoDuration::days(3)));
        scheduler.run_cycle();

        let second = scheduler.latest_check("v1").unwrap();
        assert_eq!(second.overall_status, ComplianceItemStatus::NonCompliant);
        assert!(second.score < first.score);
        assert!(second.check_date >= first.check_date);
    }

    #[test]
    fn test_run_cycle_advances_last_recheck() {
        let directory = Arc::new(InMemoryVehicleDirectory::new());
        directory.upsert(record(Utc::now() + ChronoDuration::days(365)));
        let scheduler = scheduler_with(directory);

        let before = scheduler.last_recheck();
        std::thread::sleep(Duration::from_millis(5));
        scheduler.run_cycle();
        assert!(scheduler.last_recheck() > before);
    }
}
