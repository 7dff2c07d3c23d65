//! # Fleet Sentinel Server Entry Point
//!
//! Wires the analyzers, ingestion pipeline and broadcast server together
//! and runs until interrupted. Collaborator backends default to the
//! in-memory adapters; a deployment swaps those for real services.

use log::{info, warn};
use sentinel::audit::{AuditLog, AuditWriter, AuditWriterConfig};
use sentinel::collaborators::{
    InMemoryAlertSink, InMemoryDeviceManager, InMemoryVehicleDirectory, NeutralAnalytics,
    StaticAuthProvider,
};
use sentinel::{
    ComplianceConfig, ComplianceRecheckScheduler, ComplianceRuleEngine, DriverSessionTracker,
    IntegrationHealthTracker, MaintenanceRecommendationEngine, MaintenanceThresholds,
    RealtimeBroadcastServer, SchedulerConfig, ServerConfig, SessionConfig,
    TelemetryIngestionPipeline,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=================================================");
    println!("  Fleet Sentinel - Telemetry Analysis & Fan-out  ");
    println!("=================================================");
    println!();

    // Collaborator backends
    let auth = Arc::new(StaticAuthProvider::new());
    let directory = Arc::new(InMemoryVehicleDirectory::new());
    let devices = Arc::new(InMemoryDeviceManager::new());
    let alerts = Arc::new(InMemoryAlertSink::new());
    let analytics = Arc::new(NeutralAnalytics);

    // Audit trail; runs disabled if the log directory is unusable
    let audit_dir = std::env::var("SENTINEL_AUDIT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| AuditWriterConfig::default().base_dir);
    let audit = Arc::new(
        match AuditWriter::new(AuditWriterConfig {
            base_dir: audit_dir.clone(),
            ..AuditWriterConfig::default()
        }) {
            Ok(writer) => AuditLog::new(writer),
            Err(e) => {
                warn!("AUDIT_DISABLED dir={} error={}", audit_dir.display(), e);
                AuditLog::disabled()
            }
        },
    );

    // Analyzers
    let compliance_config = Arc::new(ComplianceConfig::default());
    let compliance = Arc::new(ComplianceRuleEngine::new(
        Arc::clone(&compliance_config),
        directory.clone(),
    ));
    let maintenance = Arc::new(MaintenanceRecommendationEngine::new(
        MaintenanceThresholds::default(),
    ));
    let sessions = Arc::new(DriverSessionTracker::new(
        SessionConfig::default(),
        analytics.clone(),
    ));
    let health = Arc::new(IntegrationHealthTracker::new(
        devices.clone(),
        alerts.clone(),
    ));

    // Broadcast server
    let server_config = ServerConfig::default();
    let bind_addr = server_config.bind_addr.clone();
    let server = Arc::new(RealtimeBroadcastServer::new(
        server_config,
        auth.clone(),
        directory.clone(),
        Arc::clone(&health),
        Arc::clone(&audit),
    ));

    // Ingestion pipeline
    let pipeline = Arc::new(TelemetryIngestionPipeline::new(
        Arc::clone(&compliance),
        Arc::clone(&maintenance),
        Arc::clone(&sessions),
        Arc::clone(&health),
        Arc::clone(&server),
        alerts.clone(),
        Arc::clone(&audit),
    ));

    // Periodic regulatory re-check
    let scheduler = Arc::new(ComplianceRecheckScheduler::new(
        Arc::clone(&compliance),
        Arc::clone(&health),
        SchedulerConfig {
            recheck_interval: compliance_config.recheck_interval,
            enabled: true,
        },
    ));

    println!("Configuration:");
    println!("  - Listening on: {}", bind_addr);
    println!("  - Audit directory: {}", audit_dir.display());
    println!(
        "  - Compliance re-check every {}s",
        compliance_config.recheck_interval.as_secs()
    );
    println!("  - Registered vehicles: {}", directory.len());
    println!();

    info!("SERVER_STARTING addr={}", bind_addr);

    tokio::spawn(Arc::clone(&scheduler).start());
    tokio::spawn(Arc::clone(&server).run_sweeper());
    let accept = tokio::spawn(Arc::clone(&server).run());

    tokio::signal::ctrl_c().await?;
    info!("SHUTDOWN_REQUESTED");

    scheduler.shutdown();
    server.shutdown();
    accept.await??;

    let stats = pipeline.stats();
    info!(
        "SHUTDOWN_COMPLETE samples={} events={} violations={}",
        stats.samples_processed, stats.events_processed, stats.violations_detected
    );
    Ok(())
}
