//! Periodic LTFRB-style regulatory compliance checks.
//!
//! Six fixed items per vehicle, each computing its own status from an expiry
//! date (or a boolean rule for route authorization). Rerun on the scheduler's
//! interval and on demand; the latest check supersedes earlier ones.

use crate::collaborators::VehicleRecord;
use crate::config::ComplianceConfig;
use crate::error::{Result, SentinelError};
use crate::types::{ComplianceCheck, ComplianceItem, ComplianceItemStatus};
use chrono::{DateTime, Utc};

use super::engine::ComplianceRuleEngine;

impl ComplianceRuleEngine {
    /// Run the six-item regulatory check for `vehicle_id` as of `now`.
    pub fn perform_compliance_check(
        &self,
        vehicle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ComplianceCheck> {
        let record = self.directory().lookup(vehicle_id).ok_or_else(|| {
            SentinelError::processing(
                "regulatory",
                format!("vehicle {} not found in directory", vehicle_id),
            )
        })?;

        let config = self.config();
        let items = vec![
            expiry_item(
                "franchise_validity",
                record.franchise_expiry,
                config.franchise_warning_days,
                now,
                "Renew LTFRB franchise",
            ),
            expiry_item(
                "registration",
                record.registration_expiry,
                config.registration_warning_days,
                now,
                "Renew vehicle registration",
            ),
            expiry_item(
                "driver_authorization",
                record.driver_license_expiry,
                config.license_warning_days,
                now,
                "Renew driver license / authorization",
            ),
            expiry_item(
                "inspection",
                record.inspection_expiry,
                config.inspection_warning_days,
                now,
                "Schedule vehicle inspection",
            ),
            expiry_item(
                "insurance",
                record.insurance_expiry,
                config.insurance_warning_days,
                now,
                "Renew insurance coverage",
            ),
            route_item(&record),
        ];

        let compliant = items
            .iter()
            .filter(|i| i.status == ComplianceItemStatus::Compliant)
            .count();
        let score = compliant as f64 / items.len() as f64 * 100.0;
        let overall_status = overall(&items);

        Ok(ComplianceCheck {
            vehicle_id: vehicle_id.to_string(),
            check_date: now,
            items,
            score,
            overall_status,
            next_check_at: now
                + chrono::Duration::from_std(config.recheck_interval)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
        })
    }
}

/// Status for an expiry-dated item: expired past the date, warning inside the
/// lead window, non-compliant when the directory has no date on file.
fn expiry_item(
    name: &str,
    expires_at: Option<DateTime<Utc>>,
    warning_days: i64,
    now: DateTime<Utc>,
    action: &str,
) -> ComplianceItem {
    match expires_at {
        None => ComplianceItem {
            name: name.to_string(),
            status: ComplianceItemStatus::NonCompliant,
            expires_at: None,
            days_remaining: None,
            required_action: Some(format!("No {} on record", name.replace('_', " "))),
        },
        Some(expiry) => {
            let days_remaining = (expiry - now).num_days();
            let (status, required_action) = if expiry <= now {
                (ComplianceItemStatus::Expired, Some(action.to_string()))
            } else if days_remaining <= warning_days {
                (ComplianceItemStatus::Warning, Some(action.to_string()))
            } else {
                (ComplianceItemStatus::Compliant, None)
            };

            ComplianceItem {
                name: name.to_string(),
                status,
                expires_at: Some(expiry),
                days_remaining: Some(days_remaining),
                required_action,
            }
        }
    }
}

/// Route authorization is a plain boolean rule, no expiry.
fn route_item(record: &VehicleRecord) -> ComplianceItem {
    let (status, required_action) = if record.route_authorized {
        (ComplianceItemStatus::Compliant, None)
    } else {
        (
            ComplianceItemStatus::NonCompliant,
            Some("Secure route authorization".to_string()),
        )
    };
    ComplianceItem {
        name: "route_authorization".to_string(),
        status,
        expires_at: None,
        days_remaining: None,
        required_action,
    }
}

fn overall(items: &[ComplianceItem]) -> ComplianceItemStatus {
    if items.iter().any(|i| {
        matches!(
            i.status,
            ComplianceItemStatus::NonCompliant | ComplianceItemStatus::Expired
        )
    }) {
        ComplianceItemStatus::NonCompliant
    } else if items
        .iter()
        .any(|i| i.status == ComplianceItemStatus::Warning)
    {
        ComplianceItemStatus::Warning
    } else {
        ComplianceItemStatus::Compliant
    }
}
