//! Per-sample orchestration with stage-level failure isolation.
//!
//! Stage order: health update, compliance evaluation, session update,
//! maintenance update, broadcast. A panic or error in one stage is caught
//! and logged; the remaining stages still run and the sample is always
//! broadcast. A single run is never partially rolled back.

use crate::arena::KeyedArena;
use crate::audit::{AuditEvent, AuditLog};
use crate::broadcast::RealtimeBroadcastServer;
use crate::collaborators::AlertSink;
use crate::compliance::ComplianceRuleEngine;
use crate::health::IntegrationHealthTracker;
use crate::maintenance::MaintenanceRecommendationEngine;
use crate::session::DriverSessionTracker;
use crate::types::{DiagnosticEvent, TelemetrySample};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for pipeline throughput and per-stage failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub samples_processed: u64,
    pub events_processed: u64,
    pub violations_detected: u64,
    pub recommendations_generated: u64,
    pub stage_failures: u64,
}

#[derive(Default)]
struct StatCells {
    samples_processed: AtomicU64,
    events_processed: AtomicU64,
    violations_detected: AtomicU64,
    recommendations_generated: AtomicU64,
    stage_failures: AtomicU64,
}

/// Orchestrates the analyzers for each incoming sample or event.
pub struct TelemetryIngestionPipeline {
    compliance: Arc<ComplianceRuleEngine>,
    maintenance: Arc<MaintenanceRecommendationEngine>,
    sessions: Arc<DriverSessionTracker>,
    health: Arc<IntegrationHealthTracker>,
    broadcaster: Arc<RealtimeBroadcastServer>,
    alerts: Arc<dyn AlertSink>,
    audit: Arc<AuditLog>,
    /// vehicle_id → code → merged event; recurrences of a code fold into
    /// the stored event instead of opening a new one
    diagnostics: KeyedArena<HashMap<String, DiagnosticEvent>>,
    stats: StatCells,
}

impl TelemetryIngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        compliance: Arc<ComplianceRuleEngine>,
        maintenance: Arc<MaintenanceRecommendationEngine>,
        sessions: Arc<DriverSessionTracker>,
        health: Arc<IntegrationHealthTracker>,
        broadcaster: Arc<RealtimeBroadcastServer>,
        alerts: Arc<dyn AlertSink>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            compliance,
            maintenance,
            sessions,
            health,
            broadcaster,
            alerts,
            audit,
            diagnostics: KeyedArena::new(),
            stats: StatCells::default(),
        }
    }

    /// Run one telemetry sample through every stage.
    ///
    /// Stage failures are isolated: each is logged and counted, then the
    /// run continues. The sample reaches the broadcaster regardless.
    pub fn process_sample(&self, sample: &TelemetrySample) {
        self.stats.samples_processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "PIPELINE_SAMPLE vehicle={} device={}",
            sample.vehicle_id, sample.device_id
        );

        let mut failed_stages: Vec<&str> = Vec::new();

        // Stage 1: integration health
        if self
            .run_stage("health", &sample.vehicle_id, || {
                self.health.record_telemetry(sample)
            })
            .is_none()
        {
            failed_stages.push("health");
        }

        // Stage 2: compliance evaluation
        let violations = self
            .run_stage("compliance", &sample.vehicle_id, || {
                self.compliance.evaluate(sample)
            })
            .unwrap_or_else(|| {
                failed_stages.push("compliance");
                Vec::new()
            });
        for violation in &violations {
            self.stats.violations_detected.fetch_add(1, Ordering::Relaxed);
            self.health.record_violation(&violation.vehicle_id);
            self.audit.record(AuditEvent::ViolationDetected {
                vehicle_id: violation.vehicle_id.clone(),
                violation_id: violation.violation_id.clone(),
                violation_type: violation.violation_type,
                severity: violation.severity,
            });
        }

        // Stage 3: session update, only when a driver is attached and a
        // session is open for that (vehicle, driver) pair
        if let Some(driver_id) = sample.driver_id.as_deref() {
            if self.sessions.has_active_session(&sample.vehicle_id, driver_id)
                && self
                    .run_stage("session", &sample.vehicle_id, || {
                        self.sessions.record_sample(sample, &violations)
                    })
                    .is_none()
            {
                failed_stages.push("session");
            }
        }

        // Stage 4: maintenance thresholds
        match self.run_stage("maintenance", &sample.vehicle_id, || {
            self.maintenance.process_sample(sample)
        }) {
            Some(recommendations) => {
                self.stats
                    .recommendations_generated
                    .fetch_add(recommendations.len() as u64, Ordering::Relaxed);
            }
            None => failed_stages.push("maintenance"),
        }

        // Stage 5: broadcast, never skipped
        self.broadcaster.broadcast_sample(sample);
        for violation in &violations {
            self.broadcaster.broadcast_violation(violation);
        }

        if failed_stages.is_empty() {
            self.health.clear_error(&sample.vehicle_id);
        } else {
            let message = format!("pipeline stages failed: {}", failed_stages.join(", "));
            self.health.mark_error(&sample.vehicle_id, &message);
            if let Err(e) = self.alerts.process_anomaly_alert(&sample.vehicle_id, &message) {
                error!(
                    "ANOMALY_ALERT_FAILED vehicle={} error={}",
                    sample.vehicle_id, e
                );
            }
        }
    }

    /// Run one diagnostic event through the event path. A recurrence of a
    /// code already seen for the vehicle folds into the stored event.
    pub fn process_diagnostic_event(&self, incoming: &DiagnosticEvent) {
        self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "PIPELINE_DIAGNOSTIC vehicle={} code={}",
            incoming.vehicle_id, incoming.code
        );

        let event = {
            let slot = self
                .diagnostics
                .get_or_insert_with(&incoming.vehicle_id, HashMap::new);
            let mut by_code = slot.lock();
            match by_code.get_mut(&incoming.code) {
                Some(existing) => {
                    existing.merge_recurrence(incoming.last_occurred_at);
                    existing.clone()
                }
                None => {
                    by_code.insert(incoming.code.clone(), incoming.clone());
                    incoming.clone()
                }
            }
        };
        let event = &event;

        let mut failed_stages: Vec<&str> = Vec::new();

        if self
            .run_stage("alert", &event.vehicle_id, || {
                self.alerts
                    .process_diagnostic_alert(event)
                    .map(|_alert_id| self.health.record_alert(&event.vehicle_id))
                    .unwrap_or_else(|e| {
                        warn!(
                            "DIAGNOSTIC_ALERT_FAILED vehicle={} error={}",
                            event.vehicle_id, e
                        );
                    })
            })
            .is_none()
        {
            failed_stages.push("alert");
        }

        match self.run_stage("maintenance", &event.vehicle_id, || {
            self.maintenance.process_diagnostic_event(event)
        }) {
            Some(recommendations) => {
                self.stats
                    .recommendations_generated
                    .fetch_add(recommendations.len() as u64, Ordering::Relaxed);
            }
            None => failed_stages.push("maintenance"),
        }

        if self
            .run_stage("health", &event.vehicle_id, || {
                self.health.record_diagnostic(event)
            })
            .is_none()
        {
            failed_stages.push("health");
        }

        self.broadcaster.broadcast_diagnostic(event);

        if !failed_stages.is_empty() {
            let message = format!("diagnostic stages failed: {}", failed_stages.join(", "));
            self.health.mark_error(&event.vehicle_id, &message);
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            samples_processed: self.stats.samples_processed.load(Ordering::Relaxed),
            events_processed: self.stats.events_processed.load(Ordering::Relaxed),
            violations_detected: self.stats.violations_detected.load(Ordering::Relaxed),
            recommendations_generated: self
                .stats
                .recommendations_generated
                .load(Ordering::Relaxed),
            stage_failures: self.stats.stage_failures.load(Ordering::Relaxed),
        }
    }

    /// Execute one stage, converting a panic into a logged failure.
    fn run_stage<T>(
        &self,
        stage: &str,
        vehicle_id: &str,
        f: impl FnOnce() -> T,
    ) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(panic) => {
                self.stats.stage_failures.fetch_add(1, Ordering::Relaxed);
                let detail = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                error!(
                    "PIPELINE_STAGE_FAILED stage={} vehicle={} detail={}",
                    stage, vehicle_id, detail
                );
                self.audit.record(AuditEvent::Error {
                    scope: format!("pipeline.{}", stage),
                    message: detail.to_string(),
                    vehicle_id: Some(vehicle_id.to_string()),
                });
                None
            }
        }
    }
}
