//! Structured audit trail.
//!
//! Records authentication, subscription, violation-detection and error
//! events as JSONL through a rotating file writer, giving operations a
//! complete account of who connected, what they were allowed to see, and
//! what the analyzers flagged.

pub mod writer;

use crate::types::{ViolationSeverity, ViolationType};
use chrono::{DateTime, Utc};
use log::warn;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use writer::{AuditWriter, AuditWriterConfig, RotationPolicy};

/// One auditable event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Authentication {
        connection_id: String,
        user_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Subscription {
        connection_id: String,
        user_id: String,
        topic: String,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ViolationDetected {
        vehicle_id: String,
        violation_id: String,
        violation_type: ViolationType,
        severity: ViolationSeverity,
    },
    Error {
        scope: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        vehicle_id: Option<String>,
    },
}

/// An audit event with its timestamp, as written to the JSONL stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Counters over the recorded events.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditStats {
    pub total_events: u64,
    pub auth_failures: u64,
    pub subscription_rejections: u64,
    pub violations: u64,
    pub errors: u64,
}

/// Thread-safe audit recorder.
///
/// A write failure is logged and dropped; auditing never takes the pipeline
/// or server down with it.
pub struct AuditLog {
    writer: Option<Arc<AuditWriter>>,
    stats: RwLock<AuditStats>,
}

impl AuditLog {
    pub fn new(writer: AuditWriter) -> Self {
        Self {
            writer: Some(Arc::new(writer)),
            stats: RwLock::new(AuditStats::default()),
        }
    }

    /// A recorder that only keeps counters, for tests and wiring without a
    /// file sink.
    pub fn disabled() -> Self {
        Self {
            writer: None,
            stats: RwLock::new(AuditStats::default()),
        }
    }

    pub fn record(&self, event: AuditEvent) {
        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            match &event {
                AuditEvent::Authentication { success: false, .. } => stats.auth_failures += 1,
                AuditEvent::Subscription { accepted: false, .. } => {
                    stats.subscription_rejections += 1
                }
                AuditEvent::ViolationDetected { .. } => stats.violations += 1,
                AuditEvent::Error { .. } => stats.errors += 1,
                _ => {}
            }
        }

        if let Some(writer) = &self.writer {
            let record = AuditRecord {
                at: Utc::now(),
                event,
            };
            if let Err(e) = writer.write_record(&record) {
                warn!("AUDIT_WRITE_FAILED error={}", e);
            }
        }
    }

    pub fn flush(&self) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.flush() {
                warn!("AUDIT_FLUSH_FAILED error={}", e);
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        *self.stats.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_log_still_counts() {
        let log = AuditLog::disabled();
        log.record(AuditEvent::Authentication {
            connection_id: "c1".to_string(),
            user_id: "u1".to_string(),
            success: false,
            reason: Some("bad token".to_string()),
        });
        log.record(AuditEvent::ViolationDetected {
            vehicle_id: "v1".to_string(),
            violation_id: "x".to_string(),
            violation_type: ViolationType::Speeding,
            severity: ViolationSeverity::Major,
        });

        let stats = log.stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(stats.violations, 1);
    }

    #[test]
    fn test_record_serializes_with_tag() {
        let record = AuditRecord {
            at: Utc::now(),
            event: AuditEvent::Subscription {
                connection_id: "c1".to_string(),
                user_id: "u1".to_string(),
                topic: "region:NCR".to_string(),
                accepted: false,
                reason: Some("outside scope".to_string()),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "subscription");
        assert_eq!(json["accepted"], false);
        assert!(json["at"].is_string());
    }
}
