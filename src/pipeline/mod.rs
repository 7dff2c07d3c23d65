//! Ingestion pipeline: runs every decoded sample or diagnostic event
//! through the analyzers and hands the results to the broadcaster.

mod ingestion;

pub use ingestion::{PipelineStats, TelemetryIngestionPipeline};
