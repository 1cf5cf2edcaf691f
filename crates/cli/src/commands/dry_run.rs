//! `dry-run` command implementation.

use anyhow::{Context, Result};
use contracts::Message;
use ingestion::RecordSource;
use pipeline::PipelineController;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::load_config;
use crate::cli::DryRunArgs;

/// Message as it would be handed to the broker
#[derive(Serialize)]
struct MessagePreview {
    topic: String,
    key: String,
    headers: BTreeMap<String, String>,
    value: serde_json::Value,
}

impl MessagePreview {
    fn from_message(message: &Message) -> Result<Self> {
        Ok(Self {
            topic: message.topic.clone(),
            key: message.key.clone(),
            headers: message
                .headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect(),
            value: serde_json::from_slice(&message.payload)
                .context("Message body is not valid JSON")?,
        })
    }
}

/// Execute the `dry-run` command
pub fn run_dry_run(args: &DryRunArgs) -> Result<()> {
    let config = load_config(&args.config).context("Failed to load configuration")?;
    let topic = config.broker.topic.clone();
    let controller = PipelineController::new(config);
    let mut source = controller
        .open_source()
        .context("Failed to open record source")?;

    info!(source = %source.name(), limit = args.limit, "Dry run, nothing will be delivered");

    let mut total = 0u64;
    while let Some(record) = source.next_record()? {
        total += 1;
        if total as usize > args.limit {
            continue;
        }
        let message = Message::from_record(&record, &topic)?;
        let preview = MessagePreview::from_message(&message)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&preview).context("Failed to serialize message")?
        );
    }

    let snapshot = source.metrics().snapshot();
    println!("\n=== Dry Run Summary ===\n");
    println!("  Session: {}", controller.session_id());
    println!("  Topic: {}", topic);
    println!("  Rows read: {}", snapshot.rows_read);
    println!("  Valid records: {}", total);
    println!("  Rows dropped: {}", snapshot.rows_dropped);
    println!("  Shown: {}", total.min(args.limit as u64));
    println!();

    Ok(())
}
