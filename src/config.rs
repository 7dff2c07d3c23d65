//! Static rule tables and service configuration.
//!
//! Everything the engines consult at evaluation time lives here as plain
//! data with `Default` impls carrying the production tables. Construction
//! happens once at process start; the engines hold shared references.

use crate::rules::{GeoPoint, GeoRect, TimeWindow};
use crate::types::VehicleType;
use chrono::Weekday;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

// ================================================================================================
// SPEED RULES
// ================================================================================================

/// Road classification used by the speed-limit table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoadType {
    Urban,
    Highway,
    Expressway,
}

/// Fine and penalty points for one speeding severity tier.
#[derive(Clone, Copy, Debug)]
pub struct FineTier {
    pub fine: f64,
    pub penalty_points: u32,
}

/// Speed rules: per-(region, road-type) limits plus the severity fine table.
#[derive(Clone, Debug)]
pub struct SpeedRules {
    /// km/h limit per (region, road type)
    pub limits: HashMap<(String, RoadType), f64>,
    /// Fallback when the region has no entry for the resolved road type
    pub default_limit_kph: f64,
    /// Road-type overrides resolved by coordinate, first match wins
    pub road_type_overrides: Vec<(GeoRect, RoadType)>,
    /// excess <= 10
    pub minor: FineTier,
    /// 10 < excess <= 20
    pub major: FineTier,
    /// excess > 20
    pub serious: FineTier,
}

impl Default for SpeedRules {
    fn default() -> Self {
        let mut limits = HashMap::new();
        for region in ["NCR", "Region III", "Region IV-A"] {
            limits.insert((region.to_string(), RoadType::Urban), 60.0);
            limits.insert((region.to_string(), RoadType::Highway), 80.0);
            limits.insert((region.to_string(), RoadType::Expressway), 100.0);
        }

        Self {
            limits,
            default_limit_kph: 60.0,
            road_type_overrides: Vec::new(),
            minor: FineTier {
                fine: 1000.0,
                penalty_points: 1,
            },
            major: FineTier {
                fine: 2000.0,
                penalty_points: 2,
            },
            serious: FineTier {
                fine: 5000.0,
                penalty_points: 3,
            },
        }
    }
}

impl SpeedRules {
    /// Road type at a coordinate: first matching override, else urban.
    pub fn road_type_at(&self, p: GeoPoint) -> RoadType {
        self.road_type_overrides
            .iter()
            .find(|(rect, _)| rect.contains(p))
            .map(|(_, rt)| *rt)
            .unwrap_or(RoadType::Urban)
    }

    /// Limit for a region and road type, falling back to the default.
    pub fn limit_for(&self, region: &str, road_type: RoadType) -> f64 {
        self.limits
            .get(&(region.to_string(), road_type))
            .copied()
            .unwrap_or(self.default_limit_kph)
    }

    /// Fine tier for a given excess over the limit.
    pub fn tier_for_excess(&self, excess: f64) -> &FineTier {
        if excess <= 10.0 {
            &self.minor
        } else if excess <= 20.0 {
            &self.major
        } else {
            &self.serious
        }
    }
}

// ================================================================================================
// CODING / ODD-EVEN RULES
// ================================================================================================

/// Per-region number-coding schedule: restricted plate digits per weekday,
/// enforced inside two daily windows.
#[derive(Clone, Debug)]
pub struct CodingSchedule {
    pub region: String,
    /// Weekday → restricted terminal digits. Absent weekday = unrestricted.
    pub restricted_digits: HashMap<Weekday, BTreeSet<u8>>,
    pub morning_window: TimeWindow,
    pub evening_window: TimeWindow,
}

impl CodingSchedule {
    /// NCR default: odd digits on Mon/Wed/Fri, even digits on Tue/Thu,
    /// enforced 07:00-10:00 and 17:00-20:00.
    pub fn ncr_default() -> Self {
        let odd: BTreeSet<u8> = [1, 3, 5, 7, 9].into_iter().collect();
        let even: BTreeSet<u8> = [0, 2, 4, 6, 8].into_iter().collect();

        let mut restricted_digits = HashMap::new();
        restricted_digits.insert(Weekday::Mon, odd.clone());
        restricted_digits.insert(Weekday::Wed, odd.clone());
        restricted_digits.insert(Weekday::Fri, odd);
        restricted_digits.insert(Weekday::Tue, even.clone());
        restricted_digits.insert(Weekday::Thu, even);

        Self {
            region: "NCR".to_string(),
            restricted_digits,
            morning_window: TimeWindow::parse("07:00", "10:00").expect("static window"),
            evening_window: TimeWindow::parse("17:00", "20:00").expect("static window"),
        }
    }
}

// ================================================================================================
// RESTRICTED ZONES
// ================================================================================================

/// A polygon-bounded zone closed to certain vehicle types in certain hours.
#[derive(Clone, Debug)]
pub struct RestrictedZone {
    pub name: String,
    pub region: String,
    pub boundary: Vec<GeoPoint>,
    pub restricted_types: BTreeSet<VehicleType>,
    pub restricted_windows: Vec<TimeWindow>,
}

// ================================================================================================
// PROHIBITED HOURS
// ================================================================================================

/// Vehicle-type/region prohibited-hours rule (truck bans and the like).
#[derive(Clone, Debug)]
pub struct ProhibitedHoursRule {
    pub region: String,
    pub vehicle_type: VehicleType,
    pub days: Vec<Weekday>,
    pub window: TimeWindow,
}

impl ProhibitedHoursRule {
    /// NCR weekday truck ban, 06:00-10:00.
    pub fn ncr_truck_ban() -> Self {
        Self {
            region: "NCR".to_string(),
            vehicle_type: VehicleType::Truck,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            window: TimeWindow::parse("06:00", "10:00").expect("static window"),
        }
    }
}

// ================================================================================================
// REGION RESOLUTION
// ================================================================================================

/// Coarse coordinate → region mapping, first match wins.
#[derive(Clone, Debug)]
pub struct RegionMap {
    pub regions: Vec<(String, GeoRect)>,
    pub default_region: String,
}

impl Default for RegionMap {
    fn default() -> Self {
        Self {
            regions: vec![(
                "NCR".to_string(),
                GeoRect {
                    min_lat: 14.35,
                    min_lon: 120.90,
                    max_lat: 14.80,
                    max_lon: 121.15,
                },
            )],
            default_region: "NCR".to_string(),
        }
    }
}

impl RegionMap {
    pub fn region_at(&self, p: GeoPoint) -> &str {
        self.regions
            .iter()
            .find(|(_, rect)| rect.contains(p))
            .map(|(name, _)| name.as_str())
            .unwrap_or(self.default_region.as_str())
    }
}

// ================================================================================================
// COMPLIANCE ENGINE CONFIG
// ================================================================================================

/// All rule tables consulted by the compliance engine.
#[derive(Clone, Debug)]
pub struct ComplianceConfig {
    pub speed: SpeedRules,
    pub region_map: RegionMap,
    /// Region → coding schedule
    pub coding: HashMap<String, CodingSchedule>,
    pub restricted_zones: Vec<RestrictedZone>,
    pub prohibited_hours: Vec<ProhibitedHoursRule>,
    /// Fine for a coding/odd-even violation
    pub coding_fine: FineTier,
    /// Fine for entering a restricted zone
    pub zone_fine: FineTier,
    /// Fine for a prohibited-hours violation
    pub time_restriction_fine: FineTier,
    /// Warning lead time (days) per regulatory item
    pub franchise_warning_days: i64,
    pub registration_warning_days: i64,
    pub license_warning_days: i64,
    pub inspection_warning_days: i64,
    pub insurance_warning_days: i64,
    /// How often the periodic compliance check reruns
    pub recheck_interval: Duration,
    /// Local wall-clock offset from UTC, in hours. Coding days and rule
    /// windows are evaluated in local time.
    pub utc_offset_hours: i32,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        let mut coding = HashMap::new();
        coding.insert("NCR".to_string(), CodingSchedule::ncr_default());

        Self {
            speed: SpeedRules::default(),
            region_map: RegionMap::default(),
            coding,
            restricted_zones: Vec::new(),
            prohibited_hours: vec![ProhibitedHoursRule::ncr_truck_ban()],
            coding_fine: FineTier {
                fine: 500.0,
                penalty_points: 1,
            },
            zone_fine: FineTier {
                fine: 2000.0,
                penalty_points: 2,
            },
            time_restriction_fine: FineTier {
                fine: 1500.0,
                penalty_points: 2,
            },
            franchise_warning_days: 60,
            registration_warning_days: 30,
            license_warning_days: 14,
            inspection_warning_days: 30,
            insurance_warning_days: 30,
            recheck_interval: Duration::from_secs(60 * 60),
            utc_offset_hours: 8,
        }
    }
}

// ================================================================================================
// MAINTENANCE THRESHOLDS
// ================================================================================================

/// Fixed thresholds and costs for the maintenance analyzers.
#[derive(Clone, Debug)]
pub struct MaintenanceThresholds {
    pub engine_temp_max_c: f64,
    pub engine_temp_cost: f64,
    pub battery_min_volts: f64,
    pub battery_cost: f64,
    pub oil_min_kpa: f64,
    pub oil_cost: f64,
    /// Default cost attached to DTC-driven recommendations
    pub diagnostic_cost: f64,
}

impl Default for MaintenanceThresholds {
    fn default() -> Self {
        Self {
            engine_temp_max_c: 100.0,
            engine_temp_cost: 3500.0,
            battery_min_volts: 12.0,
            battery_cost: 2500.0,
            oil_min_kpa: 250.0,
            oil_cost: 4000.0,
            diagnostic_cost: 3000.0,
        }
    }
}

// ================================================================================================
// BROADCAST SERVER CONFIG
// ================================================================================================

/// Broadcast server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// TCP bind address for the connection listener
    pub bind_addr: String,
    /// Connections idle longer than this are closed by the sweep
    pub idle_timeout: Duration,
    /// Liveness sweep interval
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9460".to_string(),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Session tracker settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Below this speed a sample counts toward idle time
    pub idle_speed_threshold_kph: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_speed_threshold_kph: 3.0,
        }
    }
}
