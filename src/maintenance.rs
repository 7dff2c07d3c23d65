//! Maintenance recommendation engine.
//!
//! Stateless threshold rules over telemetry plus a DTC-driven path for
//! diagnostic events, feeding a per-vehicle store that deduplicates by
//! (component, recommendation type). Recommendations are appended, never
//! auto-removed; resolution is an external workflow concern surfaced through
//! `mark_resolved`.

use crate::arena::KeyedArena;
use crate::config::MaintenanceThresholds;
use crate::types::{
    DiagnosticEvent, DiagnosticSeverity, MaintenanceRecommendation, RecommendationEvidence,
    RecommendationPriority, RecommendationType, TelemetrySample,
};
use chrono::Utc;
use log::info;
use uuid::Uuid;

/// Component implied by a DTC's first letter.
fn component_for_code(code: &str) -> &'static str {
    match code.chars().next() {
        Some('P') | Some('p') => "engine_system",
        Some('C') | Some('c') => "chassis_system",
        Some('B') | Some('b') => "body_system",
        Some('U') | Some('u') => "network_system",
        _ => "general",
    }
}

fn priority_for_severity(severity: DiagnosticSeverity) -> (RecommendationPriority, u32) {
    match severity {
        DiagnosticSeverity::Critical => (RecommendationPriority::Critical, 1),
        DiagnosticSeverity::Error => (RecommendationPriority::Urgent, 3),
        DiagnosticSeverity::Warning => (RecommendationPriority::Major, 7),
        DiagnosticSeverity::Info => (RecommendationPriority::Minor, 7),
    }
}

/// Threshold-based analyzer with a deduplicating per-vehicle store.
pub struct MaintenanceRecommendationEngine {
    thresholds: MaintenanceThresholds,
    /// vehicle_id → recommendation list, single writer per vehicle
    store: KeyedArena<Vec<MaintenanceRecommendation>>,
}

impl MaintenanceRecommendationEngine {
    pub fn new(thresholds: MaintenanceThresholds) -> Self {
        Self {
            thresholds,
            store: KeyedArena::new(),
        }
    }

    /// Evaluate one sample. Returns the recommendations that were actually
    /// stored (duplicates are dropped by the dedup rule).
    pub fn process_sample(&self, sample: &TelemetrySample) -> Vec<MaintenanceRecommendation> {
        let mut candidates = Vec::new();
        let t = &self.thresholds;

        if sample.engine_temp_c > t.engine_temp_max_c {
            candidates.push(self.recommendation(
                &sample.vehicle_id,
                RecommendationType::Preventive,
                "cooling_system",
                RecommendationPriority::Major,
                format!(
                    "Engine temperature {:.1}°C exceeds {:.0}°C; inspect cooling system",
                    sample.engine_temp_c, t.engine_temp_max_c
                ),
                t.engine_temp_cost,
                7,
                RecommendationEvidence::Telemetry {
                    metric: "engine_temp_c".to_string(),
                    value: sample.engine_temp_c,
                    threshold: t.engine_temp_max_c,
                },
            ));
        }

        if sample.battery_voltage < t.battery_min_volts {
            candidates.push(self.recommendation(
                &sample.vehicle_id,
                RecommendationType::Corrective,
                "battery_system",
                RecommendationPriority::Urgent,
                format!(
                    "Battery voltage {:.2}V below {:.1}V; test battery and charging circuit",
                    sample.battery_voltage, t.battery_min_volts
                ),
                t.battery_cost,
                3,
                RecommendationEvidence::Telemetry {
                    metric: "battery_voltage".to_string(),
                    value: sample.battery_voltage,
                    threshold: t.battery_min_volts,
                },
            ));
        }

        if sample.oil_pressure_kpa < t.oil_min_kpa {
            candidates.push(self.recommendation(
                &sample.vehicle_id,
                RecommendationType::Corrective,
                "oil_system",
                RecommendationPriority::Critical,
                format!(
                    "Oil pressure {:.0} kPa below {:.0} kPa; service immediately",
                    sample.oil_pressure_kpa, t.oil_min_kpa
                ),
                t.oil_cost,
                1,
                RecommendationEvidence::Telemetry {
                    metric: "oil_pressure_kpa".to_string(),
                    value: sample.oil_pressure_kpa,
                    threshold: t.oil_min_kpa,
                },
            ));
        }

        self.store_new(&sample.vehicle_id, candidates)
    }

    /// Evaluate one diagnostic event.
    pub fn process_diagnostic_event(
        &self,
        event: &DiagnosticEvent,
    ) -> Vec<MaintenanceRecommendation> {
        let component = component_for_code(&event.code);
        let (priority, urgency_days) = priority_for_severity(event.severity);

        let candidate = self.recommendation(
            &event.vehicle_id,
            RecommendationType::Corrective,
            component,
            priority,
            format!("Diagnostic code {}: {}", event.code, event.description),
            self.thresholds.diagnostic_cost,
            urgency_days,
            RecommendationEvidence::DiagnosticCode {
                code: event.code.clone(),
                occurrences: event.occurrence_count,
            },
        );

        self.store_new(&event.vehicle_id, vec![candidate])
    }

    /// All stored recommendations for a vehicle.
    pub fn recommendations_for(&self, vehicle_id: &str) -> Vec<MaintenanceRecommendation> {
        self.store.get_cloned(vehicle_id).unwrap_or_default()
    }

    /// Mark a recommendation resolved, freeing its dedup slot. Returns false
    /// when the id is unknown.
    pub fn mark_resolved(&self, vehicle_id: &str, recommendation_id: &str) -> bool {
        self.store
            .with_entry(vehicle_id, |list| {
                for rec in list.iter_mut() {
                    if rec.recommendation_id == recommendation_id && !rec.resolved {
                        rec.resolved = true;
                        return true;
                    }
                }
                false
            })
            .unwrap_or(false)
    }

    /// Append candidates that do not collide with an existing unresolved
    /// (component, type) entry. Runs under the vehicle's entry lock so
    /// concurrent samples cannot double-insert.
    fn store_new(
        &self,
        vehicle_id: &str,
        candidates: Vec<MaintenanceRecommendation>,
    ) -> Vec<MaintenanceRecommendation> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let slot = self.store.get_or_insert_with(vehicle_id, Vec::new);
        let mut list = slot.lock();

        let mut stored = Vec::new();
        for candidate in candidates {
            let duplicate = list.iter().any(|existing| {
                !existing.resolved
                    && existing.component == candidate.component
                    && existing.recommendation_type == candidate.recommendation_type
            });
            if duplicate {
                continue;
            }
            info!(
                "MAINTENANCE_RECOMMENDED vehicle={} component={} type={:?} priority={:?}",
                vehicle_id, candidate.component, candidate.recommendation_type, candidate.priority
            );
            list.push(candidate.clone());
            stored.push(candidate);
        }
        stored
    }

    #[allow(clippy::too_many_arguments)]
    fn recommendation(
        &self,
        vehicle_id: &str,
        recommendation_type: RecommendationType,
        component: &str,
        priority: RecommendationPriority,
        description: String,
        estimated_cost: f64,
        urgency_days: u32,
        evidence: RecommendationEvidence,
    ) -> MaintenanceRecommendation {
        MaintenanceRecommendation {
            recommendation_id: Uuid::new_v4().to_string(),
            vehicle_id: vehicle_id.to_string(),
            recommendation_type,
            component: component.to_string(),
            priority,
            description,
            estimated_cost,
            urgency_days,
            evidence,
            resolved: false,
            created_at: Utc::now(),
        }
    }
}
