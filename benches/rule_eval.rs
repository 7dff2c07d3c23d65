use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use sentinel::collaborators::{VehicleDirectory, VehicleRecord};
use sentinel::compliance::ComplianceRuleEngine;
use sentinel::config::ComplianceConfig;
use sentinel::types::{GpsPosition, TelemetrySample, VehicleType};
use std::sync::Arc;

struct FixedDirectory(VehicleRecord);

impl VehicleDirectory for FixedDirectory {
    fn lookup(&self, _vehicle_id: &str) -> Option<VehicleRecord> {
        Some(self.0.clone())
    }
}

fn record() -> VehicleRecord {
    VehicleRecord {
        vehicle_id: "v1".to_string(),
        plate_number: "NBC 1234".to_string(),
        vehicle_type: VehicleType::PrivateCar,
        home_region: "NCR".to_string(),
        operator_id: None,
        franchise_expiry: None,
        registration_expiry: None,
        driver_license_expiry: None,
        inspection_expiry: None,
        insurance_expiry: None,
        route_authorized: true,
    }
}

fn make_sample(speed: f64) -> TelemetrySample {
    let at = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
    TelemetrySample {
        vehicle_id: "v1".to_string(),
        device_id: "d1".to_string(),
        driver_id: Some("drv1".to_string()),
        position: GpsPosition {
            latitude: 14.6,
            longitude: 121.0,
            accuracy_m: 5.0,
        },
        speed_kph: speed,
        engine_rpm: 2400.0,
        engine_load_pct: 50.0,
        engine_temp_c: 92.0,
        coolant_temp_c: 88.0,
        fuel_level_pct: 50.0,
        fuel_rate_lph: 7.5,
        battery_voltage: 13.7,
        oil_pressure_kpa: 310.0,
        odometer_km: 60_000.0,
        harsh_acceleration: 0,
        harsh_braking: 1,
        active_dtcs: vec![],
        pending_dtcs: vec![],
        data_quality: 0.96,
        recorded_at: at,
        received_at: at,
    }
}

fn bench_rule_eval(c: &mut Criterion) {
    let engine = ComplianceRuleEngine::new(
        Arc::new(ComplianceConfig::default()),
        Arc::new(FixedDirectory(record())),
    );
    let clean = make_sample(55.0);
    let speeding = make_sample(95.0);

    c.bench_function("evaluate_clean_sample", |b| {
        b.iter(|| engine.evaluate(&clean));
    });
    c.bench_function("evaluate_speeding_sample", |b| {
        b.iter(|| engine.evaluate(&speeding));
    });
}

criterion_group!(benches, bench_rule_eval);
criterion_main!(benches);
