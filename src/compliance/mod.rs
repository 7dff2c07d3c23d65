//! Compliance analysis: traffic-rule evaluation and periodic regulatory
//! checks.
//!
//! Two surfaces:
//! 1. **Traffic evaluation** (`ComplianceRuleEngine::evaluate`): runs every
//!    telemetry sample through four independent checks (speed, coding,
//!    restricted zone, prohibited hours) and yields zero or more violations.
//! 2. **Regulatory checks** (`ComplianceRuleEngine::perform_compliance_check`):
//!    periodic six-item LTFRB-style review of franchise, registration,
//!    driver authorization, inspection, insurance and route authorization.

pub mod engine;
pub mod regulatory;

pub use engine::ComplianceRuleEngine;
