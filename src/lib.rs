//! # Fleet Sentinel
//!
//! Real-time telemetry analysis for vehicle fleets. Decoded OBD samples and
//! diagnostic events run through a chain of rule-based analyzers and fan out
//! to authorized subscribers over a persistent connection protocol.
//!
//! ## Architecture
//!
//! - [`compliance`]: traffic-law rule engine (speed, number coding,
//!   restricted zones, prohibited hours) plus the six-item regulatory
//!   checklist.
//! - [`maintenance`]: threshold and diagnostic-code driven maintenance
//!   recommendations with per-vehicle dedup.
//! - [`session`]: driver session lifecycle and per-session aggregates.
//! - [`health`]: per-vehicle integration health rollup.
//! - [`pipeline`]: orchestrates the analyzers per sample with stage-level
//!   failure isolation.
//! - [`broadcast`]: connection registry, authentication, topic-scoped
//!   authorization, fan-out, liveness sweep.
//! - [`scheduler`]: periodic regulatory re-check.
//! - [`audit`]: JSONL audit trail with size-based rotation.
//!
//! Work for a single vehicle is serialized through a per-key lock
//! ([`arena::KeyedArena`]); samples for different vehicles process
//! concurrently.

pub mod arena;
pub mod audit;
pub mod broadcast;
pub mod collaborators;
pub mod compliance;
pub mod config;
pub mod error;
pub mod health;
pub mod maintenance;
pub mod pipeline;
pub mod rules;
pub mod scheduler;
pub mod session;
pub mod types;

pub use broadcast::{RealtimeBroadcastServer, ServerStats};
pub use compliance::ComplianceRuleEngine;
pub use config::{ComplianceConfig, MaintenanceThresholds, ServerConfig, SessionConfig};
pub use error::{Result, SentinelError};
pub use health::IntegrationHealthTracker;
pub use maintenance::MaintenanceRecommendationEngine;
pub use pipeline::{PipelineStats, TelemetryIngestionPipeline};
pub use scheduler::{ComplianceRecheckScheduler, SchedulerConfig};
pub use session::DriverSessionTracker;
