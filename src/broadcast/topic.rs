//! Typed broadcast topics and their authorization predicates.
//!
//! Topics cross the wire as `kind:identifier` strings but are parsed into a
//! descriptor immediately; every authorization checkpoint works on the typed
//! form, never on raw strings.

use crate::collaborators::AuthGrant;
use crate::error::{Result, SentinelError};
use std::fmt;

/// A broadcast channel a connection can subscribe to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Everything about one vehicle
    Vehicle(String),
    /// Everything about one operator's fleet
    Operator(String),
    /// Everything resolved to one region
    Region(String),
    /// One payload kind across the fleet, e.g. `type:telemetry`
    DataType(String),
    /// Aggregate performance updates
    Performance,
}

impl Topic {
    /// Parse a `kind:identifier` string.
    pub fn parse(raw: &str) -> Result<Topic> {
        let (kind, identifier) = raw
            .split_once(':')
            .ok_or_else(|| SentinelError::Validation(format!("malformed topic '{}'", raw)))?;

        if identifier.is_empty() {
            return Err(SentinelError::Validation(format!(
                "topic '{}' has an empty identifier",
                raw
            )));
        }

        match kind {
            "vehicle" => Ok(Topic::Vehicle(identifier.to_string())),
            "operator" => Ok(Topic::Operator(identifier.to_string())),
            "region" => Ok(Topic::Region(identifier.to_string())),
            "type" => Ok(Topic::DataType(identifier.to_string())),
            "performance" => Ok(Topic::Performance),
            _ => Err(SentinelError::Validation(format!(
                "unknown topic kind '{}'",
                kind
            ))),
        }
    }

    /// Authorization predicate for subscribing, keyed by topic kind.
    /// Delivery-time payload checks (vehicle region) are separate.
    pub fn authorize(&self, grant: &AuthGrant) -> Result<()> {
        match self {
            Topic::Vehicle(_) | Topic::DataType(_) => Ok(()),
            Topic::Operator(id) => {
                if grant.has_permission("operator:view") || grant.has_permission("operator:manage")
                {
                    Ok(())
                } else {
                    Err(SentinelError::Authorization(format!(
                        "operator topic '{}' requires operator:view or operator:manage",
                        id
                    )))
                }
            }
            Topic::Region(region) => {
                if grant.region_scope.allows(region) {
                    Ok(())
                } else {
                    Err(SentinelError::Authorization(format!(
                        "region '{}' outside allowed scope",
                        region
                    )))
                }
            }
            Topic::Performance => {
                if grant.has_permission("analytics:view") {
                    Ok(())
                } else {
                    Err(SentinelError::Authorization(
                        "performance topic requires analytics:view".to_string(),
                    ))
                }
            }
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Vehicle(id) => write!(f, "vehicle:{}", id),
            Topic::Operator(id) => write!(f, "operator:{}", id),
            Topic::Region(id) => write!(f, "region:{}", id),
            Topic::DataType(id) => write!(f, "type:{}", id),
            Topic::Performance => write!(f, "performance:updates"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RegionScope;
    use std::collections::BTreeSet;

    fn grant(permissions: &[&str], scope: RegionScope) -> AuthGrant {
        AuthGrant {
            user_id: "u1".to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            region_scope: scope,
        }
    }

    fn ncr_only() -> RegionScope {
        RegionScope::Limited(BTreeSet::from(["NCR".to_string()]))
    }

    #[test]
    fn test_parse_round_trip() {
        for raw in [
            "vehicle:v1",
            "operator:op9",
            "region:NCR",
            "type:telemetry",
            "performance:updates",
        ] {
            let topic = Topic::parse(raw).unwrap();
            assert_eq!(topic.to_string(), raw);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Topic::parse("no-colon").is_err());
        assert!(Topic::parse("region:").is_err());
        assert!(Topic::parse("rooms:x").is_err());
    }

    #[test]
    fn test_region_needs_scope_or_admin() {
        let topic = Topic::parse("region:NCR").unwrap();
        assert!(topic.authorize(&grant(&[], RegionScope::All)).is_ok());
        assert!(topic.authorize(&grant(&[], ncr_only())).is_ok());

        let other = Topic::parse("region:Region III").unwrap();
        assert!(other.authorize(&grant(&[], ncr_only())).is_err());
    }

    #[test]
    fn test_operator_needs_permission() {
        let topic = Topic::parse("operator:op9").unwrap();
        assert!(topic.authorize(&grant(&[], RegionScope::All)).is_err());
        assert!(topic
            .authorize(&grant(&["operator:view"], ncr_only()))
            .is_ok());
        assert!(topic
            .authorize(&grant(&["operator:manage"], ncr_only()))
            .is_ok());
    }

    #[test]
    fn test_performance_needs_analytics() {
        let topic = Topic::Performance;
        assert!(topic.authorize(&grant(&[], RegionScope::All)).is_err());
        assert!(topic
            .authorize(&grant(&["analytics:view"], RegionScope::All))
            .is_ok());
    }

    #[test]
    fn test_vehicle_topic_open_to_authenticated() {
        let topic = Topic::parse("vehicle:v1").unwrap();
        assert!(topic.authorize(&grant(&[], ncr_only())).is_ok());
    }
}
