//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::IngestConfig;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!("Loading configuration info");
    let config = load_config(&args.config).context("Failed to load configuration")?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&config)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn print_config_info(config: &IngestConfig) {
    let pipeline = &config.pipeline;
    let source = &config.source;
    let broker = &config.broker;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Sentinel Ingest Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Pipeline");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Mode: {}", pipeline.mode);
    println!("   ├─ Workers: {}", pipeline.worker_count);
    println!(
        "   ├─ Retries: {} (base backoff {}ms)",
        pipeline.max_retries, pipeline.base_backoff_ms
    );
    println!("   ├─ Flush timeout: {}s", pipeline.flush_timeout_secs);
    println!("   ├─ Queue capacity: {}", pipeline.queue_capacity);
    println!("   └─ Event buffer: {}", pipeline.event_buffer);

    println!("\n📥 Source");
    match &source.csv_path {
        Some(path) => println!("   ├─ CSV: {}", path.display()),
        None => println!("   ├─ CSV: (not set)"),
    }
    println!("   ├─ Vehicle: {}", source.vehicle_id);
    match &source.session_id {
        Some(session) => println!("   └─ Session: {}", session),
        None => println!("   └─ Session: (generated per run)"),
    }

    println!("\n📤 Broker");
    println!("   ├─ Topic: {}", broker.topic);
    println!("   ├─ Transport: {:?}", broker.transport);
    if let Some(ref path) = broker.log_path {
        println!("   ├─ Log path: {}", path.display());
    }
    println!("   ├─ Partitions: {}", broker.partitions);
    println!("   ├─ Buffer capacity: {}", broker.buffer_capacity);
    println!("   └─ Max message size: {} bytes", broker.max_message_bytes);

    println!();
}
