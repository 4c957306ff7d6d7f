// Copyright (c) 2025 - Cowboy AI, Inc.
//! User Projector Service
//!
//! Keeps the user read model in the NATS KV bucket up to date.
//!
//! - Events → partitioned topic → projection consumer → KV read model
//! - Event log → outbox relay → topic (commits the command path never published)
//!
//! The relay shares the publication ledger bucket with every process running
//! commands, so it only publishes what none of them did.
//!
//! When the consumer reports an inconsistency the projector stops it, rebuilds
//! the read model from the full event log and starts it again.
//!
//! Run with: cargo run --bin user-projector
//!
//! Prerequisites:
//! 1. NATS server with JetStream running (default: localhost:4222)
//! 2. Optional `USER_REGISTRY_*` environment variables (see `config`)

use anyhow::{Context, Result};
use cim_user_registry::{RegistryConfig, UserRegistry};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting User Projector Service");

    // Load configuration
    let config = RegistryConfig::from_env().context("Invalid USER_REGISTRY_* configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - NATS servers: {}", config.nats.servers.join(","));
    info!("  - Event stream: {}", config.event_stream);
    info!("  - Topic: {} ({} partitions)", config.topic, config.partitions);
    info!("  - Consumer group: {}", config.consumer_group);
    info!("  - Read model bucket: {}", config.read_model_bucket);
    info!("  - Outbox ledger bucket: {}", config.outbox.ledger_bucket);

    // Connect adapters
    info!("🔌 Connecting to NATS");
    let registry = UserRegistry::connect(config)
        .await
        .context("Failed to connect user registry to NATS")?;
    info!("✅ Connected to NATS");

    // Outbox relay runs for the lifetime of the process
    let (relay_shutdown, relay_shutdown_rx) = watch::channel(false);
    let relay = registry.outbox_relay().spawn(relay_shutdown_rx);

    info!("🎧 Starting projection consumer");
    let mut consumer = registry
        .projection_consumer()
        .start()
        .await
        .context("Failed to start projection consumer")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("⚠️ Failed to listen for Ctrl-C: {}", e);
                }
                info!("🛑 Shutdown requested");
                break;
            }
            fault = consumer.next_fault() => {
                let Some(fault) = fault else {
                    warn!("⚠️ Projection consumer stopped unexpectedly");
                    break;
                };

                error!(
                    aggregate_id = %fault.aggregate_id,
                    sequence = fault.sequence,
                    reason = %fault.reason,
                    "❌ Read model inconsistent, rebuilding"
                );

                consumer.shutdown().await;
                let report = registry
                    .rebuild_read_model()
                    .await
                    .context("Read model rebuild failed")?;
                info!(
                    "✅ Rebuilt read model: {} commits, {} events (log position {})",
                    report.commits, report.events, report.last_position
                );

                consumer = registry
                    .projection_consumer()
                    .start()
                    .await
                    .context("Failed to restart projection consumer")?;
            }
        }
    }

    info!(processed = consumer.processed(), "📊 Stopping projection consumer");
    consumer.shutdown().await;

    let _ = relay_shutdown.send(true);
    if let Err(e) = relay.await {
        error!("⚠️ Outbox relay task failed: {}", e);
    }

    info!("👋 User Projector Service stopped");
    Ok(())
}
