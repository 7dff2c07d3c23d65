//! Traffic-rule evaluation over single telemetry samples.

use crate::collaborators::{VehicleDirectory, VehicleRecord};
use crate::config::ComplianceConfig;
use crate::rules::{plate, point_in_polygon, GeoPoint};
use crate::types::{
    GpsPosition, TelemetrySample, TrafficViolation, ViolationSeverity, ViolationStatus,
    ViolationType,
};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use log::debug;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Evaluates telemetry samples against the configured traffic rules.
///
/// Each of the four checks is independent and emits at most one violation
/// per sample; a single sample can therefore produce several violations of
/// different types at once.
pub struct ComplianceRuleEngine {
    config: Arc<ComplianceConfig>,
    directory: Arc<dyn VehicleDirectory>,
}

impl ComplianceRuleEngine {
    pub fn new(config: Arc<ComplianceConfig>, directory: Arc<dyn VehicleDirectory>) -> Self {
        Self { config, directory }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub(crate) fn directory(&self) -> &dyn VehicleDirectory {
        self.directory.as_ref()
    }

    /// Run all four traffic checks against one sample.
    pub fn evaluate(&self, sample: &TelemetrySample) -> Vec<TrafficViolation> {
        let point = GeoPoint::new(sample.position.latitude, sample.position.longitude);
        let region = self.config.region_map.region_at(point).to_string();
        let (weekday, local_time) = self.local_day_time(sample.recorded_at);

        // Plate, type and home region come from the directory; without a
        // record only the speed check can run.
        let record = self.directory.lookup(&sample.vehicle_id);

        let mut violations = Vec::new();

        if let Some(v) = self.check_speed(sample, point, &region) {
            violations.push(v);
        }

        if let Some(record) = record.as_ref() {
            if let Some(v) = self.check_coding(sample, record, &region, weekday, local_time) {
                violations.push(v);
            }
            if let Some(v) = self.check_restricted_zone(sample, record, point, local_time) {
                violations.push(v);
            }
            if let Some(v) = self.check_prohibited_hours(sample, record, &region, weekday, local_time)
            {
                violations.push(v);
            }
        } else {
            debug!(
                "COMPLIANCE_NO_RECORD vehicle={} checks=speed-only",
                sample.vehicle_id
            );
        }

        violations
    }

    /// Weekday and wall-clock time of a sample in the configured local zone.
    fn local_day_time(&self, at: DateTime<Utc>) -> (Weekday, NaiveTime) {
        let offset = FixedOffset::east_opt(self.config.utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        let local = at.with_timezone(&offset);
        (local.weekday(), local.time())
    }

    // ============================================================================================
    // INDIVIDUAL CHECKS
    // ============================================================================================

    fn check_speed(
        &self,
        sample: &TelemetrySample,
        point: GeoPoint,
        region: &str,
    ) -> Option<TrafficViolation> {
        let road_type = self.config.speed.road_type_at(point);
        let limit = self.config.speed.limit_for(region, road_type);

        if sample.speed_kph <= limit {
            return None;
        }

        let excess = sample.speed_kph - limit;
        let tier = self.config.speed.tier_for_excess(excess);
        let severity = if excess <= 10.0 {
            ViolationSeverity::Minor
        } else if excess <= 20.0 {
            ViolationSeverity::Major
        } else {
            ViolationSeverity::Serious
        };

        Some(self.violation(
            sample,
            ViolationType::Speeding,
            severity,
            region,
            tier.fine,
            tier.penalty_points,
            json!({
                "recorded_speed_kph": sample.speed_kph,
                "limit_kph": limit,
                "excess_kph": excess,
                "road_type": format!("{:?}", road_type),
            }),
        ))
    }

    fn check_coding(
        &self,
        sample: &TelemetrySample,
        record: &VehicleRecord,
        region: &str,
        weekday: Weekday,
        local_time: NaiveTime,
    ) -> Option<TrafficViolation> {
        let schedule = self.config.coding.get(region)?;
        let digit = plate::terminal_digit(&record.plate_number)?;

        let restricted_today = schedule.restricted_digits.get(&weekday)?;
        if !restricted_today.contains(&digit) {
            return None;
        }

        let in_window = schedule.morning_window.contains(local_time)
            || schedule.evening_window.contains(local_time);
        if !in_window {
            return None;
        }

        let tier = &self.config.coding_fine;
        Some(self.violation(
            sample,
            ViolationType::CodingViolation,
            ViolationSeverity::Major,
            region,
            tier.fine,
            tier.penalty_points,
            json!({
                "plate_number": record.plate_number,
                "terminal_digit": digit,
                "weekday": format!("{:?}", weekday),
                "local_time": local_time.format("%H:%M").to_string(),
            }),
        ))
    }

    fn check_restricted_zone(
        &self,
        sample: &TelemetrySample,
        record: &VehicleRecord,
        point: GeoPoint,
        local_time: NaiveTime,
    ) -> Option<TrafficViolation> {
        let zone = self
            .config
            .restricted_zones
            .iter()
            .find(|z| point_in_polygon(point, &z.boundary))?;

        if !zone.restricted_types.contains(&record.vehicle_type) {
            return None;
        }
        if !zone
            .restricted_windows
            .iter()
            .any(|w| w.contains(local_time))
        {
            return None;
        }

        let tier = &self.config.zone_fine;
        Some(self.violation(
            sample,
            ViolationType::RestrictedZone,
            ViolationSeverity::Serious,
            &zone.region,
            tier.fine,
            tier.penalty_points,
            json!({
                "zone": zone.name,
                "vehicle_type": record.vehicle_type,
                "local_time": local_time.format("%H:%M").to_string(),
            }),
        ))
    }

    fn check_prohibited_hours(
        &self,
        sample: &TelemetrySample,
        record: &VehicleRecord,
        region: &str,
        weekday: Weekday,
        local_time: NaiveTime,
    ) -> Option<TrafficViolation> {
        let rule = self.config.prohibited_hours.iter().find(|r| {
            r.region == region
                && r.vehicle_type == record.vehicle_type
                && r.days.contains(&weekday)
                && r.window.contains(local_time)
        })?;

        let tier = &self.config.time_restriction_fine;
        Some(self.violation(
            sample,
            ViolationType::TimeRestriction,
            ViolationSeverity::Major,
            region,
            tier.fine,
            tier.penalty_points,
            json!({
                "vehicle_type": record.vehicle_type,
                "weekday": format!("{:?}", weekday),
                "window_start": rule.window.start.format("%H:%M").to_string(),
                "window_end": rule.window.end.format("%H:%M").to_string(),
            }),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn violation(
        &self,
        sample: &TelemetrySample,
        violation_type: ViolationType,
        severity: ViolationSeverity,
        region: &str,
        fine: f64,
        points: u32,
        evidence: serde_json::Value,
    ) -> TrafficViolation {
        TrafficViolation {
            violation_id: Uuid::new_v4().to_string(),
            vehicle_id: sample.vehicle_id.clone(),
            driver_id: sample.driver_id.clone(),
            violation_type,
            severity,
            position: GpsPosition {
                latitude: sample.position.latitude,
                longitude: sample.position.longitude,
                accuracy_m: sample.position.accuracy_m,
            },
            region: region.to_string(),
            fine_amount: fine,
            penalty_points: points,
            evidence,
            status: ViolationStatus::Detected,
            detected_at: sample.recorded_at,
        }
    }
}
