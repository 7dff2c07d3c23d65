//! Driver session lifecycle tracking.
//!
//! One active session per (driver, vehicle) pair. While active, samples for
//! the pair fold into running metrics; `end_session` freezes the record,
//! pulls final scores from the analytics collaborator and drops the session
//! from the active index. Ended sessions are never mutated again.

use crate::arena::KeyedArena;
use crate::collaborators::AnalyticsProvider;
use crate::config::SessionConfig;
use crate::error::{Result, SentinelError};
use crate::rules::{haversine_km, GeoPoint};
use crate::types::{DriverSession, TelemetrySample, TrafficViolation};
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// An active session plus the bookkeeping needed to turn successive samples
/// into distance and idle-time deltas.
#[derive(Clone, Debug)]
struct SessionState {
    session: DriverSession,
    last_position: Option<GeoPoint>,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// Tracks active driver sessions and their running metrics.
pub struct DriverSessionTracker {
    config: SessionConfig,
    analytics: Arc<dyn AnalyticsProvider>,
    /// session_id → state, single writer per session
    sessions: KeyedArena<SessionState>,
    /// (driver_id, vehicle_id) → active session_id
    active_index: RwLock<HashMap<(String, String), String>>,
}

impl DriverSessionTracker {
    pub fn new(config: SessionConfig, analytics: Arc<dyn AnalyticsProvider>) -> Self {
        Self {
            config,
            analytics,
            sessions: KeyedArena::new(),
            active_index: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session for (driver, vehicle). Fails only on absent inputs;
    /// when the pair already has an active session that session is returned
    /// unchanged (one active session per pair, start is idempotent).
    pub fn start_session(&self, vehicle_id: &str, driver_id: &str) -> Result<DriverSession> {
        if vehicle_id.is_empty() || driver_id.is_empty() {
            return Err(SentinelError::Validation(
                "start_session requires vehicle_id and driver_id".to_string(),
            ));
        }

        let key = (driver_id.to_string(), vehicle_id.to_string());
        {
            let index = self.active_index.read();
            if let Some(existing_id) = index.get(&key) {
                if let Some(state) = self.sessions.get_cloned(existing_id) {
                    return Ok(state.session);
                }
            }
        }

        let session = DriverSession {
            session_id: Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            distance_km: 0.0,
            max_speed_kph: 0.0,
            harsh_events: 0,
            idle_time_s: 0,
            violation_types: Default::default(),
            alert_ids: Vec::new(),
            scores: None,
        };

        let session_id = session.session_id.clone();
        self.sessions.get_or_insert_with(&session_id, || SessionState {
            session: session.clone(),
            last_position: None,
            last_recorded_at: None,
        });
        self.active_index.write().insert(key, session_id.clone());

        info!(
            "SESSION_STARTED session={} driver={} vehicle={}",
            session_id, driver_id, vehicle_id
        );
        Ok(session)
    }

    /// Whether (driver, vehicle) currently has an active session.
    pub fn has_active_session(&self, vehicle_id: &str, driver_id: &str) -> bool {
        self.active_index
            .read()
            .contains_key(&(driver_id.to_string(), vehicle_id.to_string()))
    }

    /// Fold one sample (and the violations it produced) into the pair's
    /// active session. No-op when the sample has no driver or no session is
    /// active.
    pub fn record_sample(&self, sample: &TelemetrySample, violations: &[TrafficViolation]) {
        let driver_id = match sample.driver_id.as_deref() {
            Some(d) => d,
            None => return,
        };
        let session_id = {
            let index = self.active_index.read();
            match index.get(&(driver_id.to_string(), sample.vehicle_id.clone())) {
                Some(id) => id.clone(),
                None => return,
            }
        };

        let position = GeoPoint::new(sample.position.latitude, sample.position.longitude);
        let idle_threshold = self.config.idle_speed_threshold_kph;

        self.sessions.with_entry(&session_id, |state| {
            let s = &mut state.session;

            if sample.speed_kph > s.max_speed_kph {
                s.max_speed_kph = sample.speed_kph;
            }
            s.harsh_events += sample.harsh_events();

            if let Some(last) = state.last_position {
                s.distance_km += haversine_km(last, position);
            }
            if let (Some(last_at), true) = (
                state.last_recorded_at,
                sample.speed_kph < idle_threshold,
            ) {
                let delta = (sample.recorded_at - last_at).num_seconds();
                if delta > 0 {
                    s.idle_time_s += delta as u64;
                }
            }

            for v in violations {
                s.violation_types.insert(v.violation_type);
            }

            state.last_position = Some(position);
            state.last_recorded_at = Some(sample.recorded_at);
        });
    }

    /// Attach an alert id raised while the session was active.
    pub fn record_alert(&self, vehicle_id: &str, driver_id: &str, alert_id: &str) {
        let session_id = {
            let index = self.active_index.read();
            match index.get(&(driver_id.to_string(), vehicle_id.to_string())) {
                Some(id) => id.clone(),
                None => return,
            }
        };
        self.sessions.with_entry(&session_id, |state| {
            state.session.alert_ids.push(alert_id.to_string());
        });
    }

    /// End a session: freeze metrics, pull final scores, drop from the
    /// active index. Errors when the session is unknown or already ended.
    pub fn end_session(&self, session_id: &str) -> Result<DriverSession> {
        let slot = self.sessions.remove(session_id).ok_or_else(|| {
            SentinelError::Validation(format!("session {} not found", session_id))
        })?;

        let mut state = slot.lock();
        state.session.ended_at = Some(Utc::now());
        state.session.scores = Some(
            self.analytics
                .performance_metrics(&state.session.driver_id, &state.session.vehicle_id),
        );

        self.active_index.write().remove(&(
            state.session.driver_id.clone(),
            state.session.vehicle_id.clone(),
        ));

        info!(
            "SESSION_ENDED session={} distance_km={:.2} max_speed={:.1} harsh={} idle_s={}",
            session_id,
            state.session.distance_km,
            state.session.max_speed_kph,
            state.session.harsh_events,
            state.session.idle_time_s
        );
        Ok(state.session.clone())
    }

    /// Drop a session without finalizing it (error recovery path).
    pub fn abandon_session(&self, session_id: &str) {
        if let Some(slot) = self.sessions.remove(session_id) {
            let state = slot.lock();
            self.active_index.write().remove(&(
                state.session.driver_id.clone(),
                state.session.vehicle_id.clone(),
            ));
        }
    }

    /// Snapshot of an active session.
    pub fn active_session(&self, vehicle_id: &str, driver_id: &str) -> Option<DriverSession> {
        let session_id = {
            let index = self.active_index.read();
            index
                .get(&(driver_id.to_string(), vehicle_id.to_string()))?
                .clone()
        };
        self.sessions.get_cloned(&session_id).map(|s| s.session)
    }

    pub fn active_count(&self) -> usize {
        self.active_index.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GpsPosition, SessionScores, ViolationType};
    use chrono::Duration;

    struct FixedAnalytics;

    impl AnalyticsProvider for FixedAnalytics {
        fn performance_metrics(&self, _driver_id: &str, _vehicle_id: &str) -> SessionScores {
            SessionScores {
                eco_score: 82.0,
                safety_score: 91.0,
                fuel_efficiency: 7.5,
            }
        }
    }

    fn tracker() -> DriverSessionTracker {
        DriverSessionTracker::new(SessionConfig::default(), Arc::new(FixedAnalytics))
    }

    fn sample(
        speed: f64,
        lat: f64,
        harsh: u32,
        at: DateTime<Utc>,
    ) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: "v1".to_string(),
            device_id: "d1".to_string(),
            driver_id: Some("drv1".to_string()),
            position: GpsPosition {
                latitude: lat,
                longitude: 121.0,
                accuracy_m: 5.0,
            },
            speed_kph: speed,
            engine_rpm: 2000.0,
            engine_load_pct: 40.0,
            engine_temp_c: 90.0,
            coolant_temp_c: 85.0,
            fuel_level_pct: 60.0,
            fuel_rate_lph: 6.0,
            battery_voltage: 13.8,
            oil_pressure_kpa: 300.0,
            odometer_km: 52_000.0,
            harsh_acceleration: harsh,
            harsh_braking: 0,
            active_dtcs: vec![],
            pending_dtcs: vec![],
            data_quality: 0.95,
            recorded_at: at,
            received_at: at,
        }
    }

    #[test]
    fn test_start_requires_inputs() {
        let t = tracker();
        assert!(t.start_session("", "drv1").is_err());
        assert!(t.start_session("v1", "").is_err());
        assert!(t.start_session("v1", "drv1").is_ok());
    }

    #[test]
    fn test_start_is_idempotent_per_pair() {
        let t = tracker();
        let first = t.start_session("v1", "drv1").unwrap();
        let second = t.start_session("v1", "drv1").unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(t.active_count(), 1);
    }

    #[test]
    fn test_metrics_accumulate_monotonically() {
        let t = tracker();
        t.start_session("v1", "drv1").unwrap();
        let t0 = Utc::now();

        t.record_sample(&sample(50.0, 14.60, 1, t0), &[]);
        t.record_sample(&sample(80.0, 14.61, 2, t0 + Duration::seconds(10)), &[]);
        // Idle sample: below threshold, 10s after the previous one
        t.record_sample(&sample(0.0, 14.61, 0, t0 + Duration::seconds(20)), &[]);

        let s = t.active_session("v1", "drv1").unwrap();
        assert_eq!(s.max_speed_kph, 80.0);
        assert_eq!(s.harsh_events, 3);
        assert_eq!(s.idle_time_s, 10);
        assert!(s.distance_km > 1.0); // ~1.1 km per 0.01° of latitude
    }

    #[test]
    fn test_violation_types_are_a_set() {
        let t = tracker();
        t.start_session("v1", "drv1").unwrap();
        let now = Utc::now();

        let v = TrafficViolation {
            violation_id: "x".to_string(),
            vehicle_id: "v1".to_string(),
            driver_id: Some("drv1".to_string()),
            violation_type: ViolationType::Speeding,
            severity: crate::types::ViolationSeverity::Minor,
            position: GpsPosition {
                latitude: 14.6,
                longitude: 121.0,
                accuracy_m: 5.0,
            },
            region: "NCR".to_string(),
            fine_amount: 1000.0,
            penalty_points: 1,
            evidence: serde_json::json!({}),
            status: crate::types::ViolationStatus::Detected,
            detected_at: now,
        };

        t.record_sample(&sample(70.0, 14.60, 0, now), &[v.clone()]);
        t.record_sample(&sample(72.0, 14.60, 0, now + Duration::seconds(5)), &[v]);

        let s = t.active_session("v1", "drv1").unwrap();
        assert_eq!(s.violation_types.len(), 1);
    }

    #[test]
    fn test_end_session_freezes_and_scores() {
        let t = tracker();
        let session = t.start_session("v1", "drv1").unwrap();
        let now = Utc::now();
        t.record_sample(&sample(50.0, 14.60, 1, now), &[]);

        let ended = t.end_session(&session.session_id).unwrap();
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.scores.unwrap().safety_score, 91.0);
        assert!(!t.has_active_session("v1", "drv1"));

        // Samples after end are ignored
        t.record_sample(&sample(120.0, 14.70, 5, now + Duration::seconds(30)), &[]);
        assert!(t.active_session("v1", "drv1").is_none());

        // Ending twice is an error
        assert!(t.end_session(&session.session_id).is_err());
    }

    #[test]
    fn test_sample_without_driver_is_ignored() {
        let t = tracker();
        t.start_session("v1", "drv1").unwrap();
        let mut s = sample(50.0, 14.60, 1, Utc::now());
        s.driver_id = None;
        t.record_sample(&s, &[]);
        assert_eq!(t.active_session("v1", "drv1").unwrap().harsh_events, 0);
    }

    #[test]
    fn test_abandon_clears_active_index() {
        let t = tracker();
        let session = t.start_session("v1", "drv1").unwrap();
        t.abandon_session(&session.session_id);
        assert!(!t.has_active_session("v1", "drv1"));
        assert!(t.end_session(&session.session_id).is_err());
    }
}
